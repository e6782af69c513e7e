//! Field-type markers and their classification tables.
//!
//! One byte identifies every field type and container boundary. The set is
//! closed: a byte outside it decodes to `None` and readers surface
//! `Corrupted`. Derived container markers carry ordering/uniqueness hints
//! on top of a base kind; iteration projects them onto the base kind while
//! update-equality compares the exact marker.

use crate::error::{RecordError, Result};

// ── Marker ─────────────────────────────────────────────────────────

/// Closed set of one-byte type and framing markers.
///
/// ```text
/// Byte        Meaning                    Payload
/// 'n'/'t'/'f' null / true / false        none
/// 'c' 'd' 'i' 'l'   u8 u16 u32 u64       1/2/4/8 bytes LE
/// 'C' 'D' 'I' 'L'   i8 i16 i32 i64       1/2/4/8 bytes LE
/// 'r'         float (f32)                4 bytes LE
/// 's'         string                     varint len + UTF-8 bytes
/// 'b'         binary (registered MIME)   varint mime-id + varint len + bytes
/// 'x'         binary (user tag)          varint tag-len + tag + varint len + bytes
/// '[' ']'     array begin / end          framing
/// '{' '}'     object begin / end         framing
/// '1'..'8'    column begin (u8..u64, i8..i64)
/// 'R' 'B'     column begin (float, boolean)
/// ')'         column end                 framing
/// '~' '!' '@' derived array begin (sorted multiset / unsorted set / sorted set)
/// '*' '+' '=' derived object begin (sorted multimap / unsorted map / sorted map)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Marker {
    Null = b'n',
    True = b't',
    False = b'f',

    U8 = b'c',
    U16 = b'd',
    U32 = b'i',
    U64 = b'l',
    I8 = b'C',
    I16 = b'D',
    I32 = b'I',
    I64 = b'L',
    Float = b'r',

    String = b's',
    Binary = b'b',
    UserBinary = b'x',

    ArrayBegin = b'[',
    ArrayEnd = b']',
    ObjectBegin = b'{',
    ObjectEnd = b'}',

    ColU8 = b'1',
    ColU16 = b'2',
    ColU32 = b'3',
    ColU64 = b'4',
    ColI8 = b'5',
    ColI16 = b'6',
    ColI32 = b'7',
    ColI64 = b'8',
    ColFloat = b'R',
    ColBool = b'B',
    ColEnd = b')',

    ArraySortedMultiset = b'~',
    ArrayUnsortedSet = b'!',
    ArraySortedSet = b'@',
    ObjectSortedMultimap = b'*',
    ObjectUnsortedMap = b'+',
    ObjectSortedMap = b'=',
}

/// Ordering/uniqueness hint carried by a container marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    UnsortedMultiset,
    SortedMultiset,
    UnsortedSet,
    SortedSet,
}

impl Marker {
    /// Decode a marker byte. `None` for any byte outside the closed set.
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Marker::*;
        Some(match byte {
            b'n' => Null,
            b't' => True,
            b'f' => False,
            b'c' => U8,
            b'd' => U16,
            b'i' => U32,
            b'l' => U64,
            b'C' => I8,
            b'D' => I16,
            b'I' => I32,
            b'L' => I64,
            b'r' => Float,
            b's' => String,
            b'b' => Binary,
            b'x' => UserBinary,
            b'[' => ArrayBegin,
            b']' => ArrayEnd,
            b'{' => ObjectBegin,
            b'}' => ObjectEnd,
            b'1' => ColU8,
            b'2' => ColU16,
            b'3' => ColU32,
            b'4' => ColU64,
            b'5' => ColI8,
            b'6' => ColI16,
            b'7' => ColI32,
            b'8' => ColI64,
            b'R' => ColFloat,
            b'B' => ColBool,
            b')' => ColEnd,
            b'~' => ArraySortedMultiset,
            b'!' => ArrayUnsortedSet,
            b'@' => ArraySortedSet,
            b'*' => ObjectSortedMultimap,
            b'+' => ObjectUnsortedMap,
            b'=' => ObjectSortedMap,
            _ => return None,
        })
    }

    /// Decode a marker byte, surfacing `Corrupted` outside the closed set.
    pub fn try_from_u8(byte: u8) -> Result<Self> {
        Self::from_u8(byte)
            .ok_or_else(|| RecordError::Corrupted(format!("unknown marker byte 0x{:02x}", byte)))
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Fixed payload size in bytes for zero-payload and fixed-width
    /// scalars; `None` for variable-width and framing markers.
    pub fn fixed_value_size(self) -> Option<usize> {
        use Marker::*;
        match self {
            Null | True | False => Some(0),
            U8 | I8 => Some(1),
            U16 | I16 => Some(2),
            U32 | I32 | Float => Some(4),
            U64 | I64 => Some(8),
            _ => None,
        }
    }

    /// True if the marker opens a container.
    pub fn is_container_begin(self) -> bool {
        self.is_array_begin() || self.is_object_begin() || self.is_column_begin()
    }

    /// True for the base or any derived array begin marker.
    pub fn is_array_begin(self) -> bool {
        use Marker::*;
        matches!(self, ArrayBegin | ArraySortedMultiset | ArrayUnsortedSet | ArraySortedSet)
    }

    /// True for the base or any derived object begin marker.
    pub fn is_object_begin(self) -> bool {
        use Marker::*;
        matches!(
            self,
            ObjectBegin | ObjectSortedMultimap | ObjectUnsortedMap | ObjectSortedMap
        )
    }

    /// True for any column begin marker.
    pub fn is_column_begin(self) -> bool {
        self.column_kind().is_some()
    }

    /// The column scalar kind for column begin markers.
    pub fn column_kind(self) -> Option<ColumnKind> {
        use Marker::*;
        Some(match self {
            ColU8 => ColumnKind::U8,
            ColU16 => ColumnKind::U16,
            ColU32 => ColumnKind::U32,
            ColU64 => ColumnKind::U64,
            ColI8 => ColumnKind::I8,
            ColI16 => ColumnKind::I16,
            ColI32 => ColumnKind::I32,
            ColI64 => ColumnKind::I64,
            ColFloat => ColumnKind::Float,
            ColBool => ColumnKind::Bool,
            _ => return None,
        })
    }

    /// Project a derived container marker onto its base kind. Non-derived
    /// markers map to themselves.
    pub fn base_kind(self) -> Marker {
        use Marker::*;
        match self {
            ArraySortedMultiset | ArrayUnsortedSet | ArraySortedSet => ArrayBegin,
            ObjectSortedMultimap | ObjectUnsortedMap | ObjectSortedMap => ObjectBegin,
            other => other,
        }
    }

    /// The ordering/uniqueness hint for container begin markers.
    pub fn derived_kind(self) -> Option<DerivedKind> {
        use Marker::*;
        match self {
            ArrayBegin | ObjectBegin => Some(DerivedKind::UnsortedMultiset),
            ArraySortedMultiset | ObjectSortedMultimap => Some(DerivedKind::SortedMultiset),
            ArrayUnsortedSet | ObjectUnsortedMap => Some(DerivedKind::UnsortedSet),
            ArraySortedSet | ObjectSortedMap => Some(DerivedKind::SortedSet),
            m if m.is_column_begin() => Some(DerivedKind::UnsortedMultiset),
            _ => None,
        }
    }

    /// The end marker byte that closes this container begin marker.
    pub fn end_marker(self) -> Option<Marker> {
        if self.is_array_begin() {
            Some(Marker::ArrayEnd)
        } else if self.is_object_begin() {
            Some(Marker::ObjectEnd)
        } else if self.is_column_begin() {
            Some(Marker::ColEnd)
        } else {
            None
        }
    }

    /// Short human name used in error payloads.
    pub fn type_name(self) -> &'static str {
        use Marker::*;
        match self {
            Null => "null",
            True | False => "boolean",
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            Float => "float",
            String => "string",
            Binary | UserBinary => "binary",
            ArrayEnd | ObjectEnd | ColEnd => "end-marker",
            m if m.is_array_begin() => "array",
            m if m.is_object_begin() => "object",
            _ => "column",
        }
    }
}

// ── Column kinds ───────────────────────────────────────────────────

/// Scalar kind of a column. Column elements are stored densely at the
/// kind's fixed width with no per-element markers; nulls (and for boolean
/// columns true/false) are expressed by sentinel values in the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Float,
    Bool,
}

/// Quiet-NaN bit pattern reserved as the float column null sentinel.
pub const FLOAT_NULL_BITS: u32 = 0x7fc0_0000;

/// Boolean column slot values.
pub const BOOL_FALSE: u8 = 0;
pub const BOOL_TRUE: u8 = 1;
pub const BOOL_NULL: u8 = 2;

impl ColumnKind {
    /// Element width in bytes.
    pub fn width(self) -> usize {
        use ColumnKind::*;
        match self {
            U8 | I8 | Bool => 1,
            U16 | I16 => 2,
            U32 | I32 | Float => 4,
            U64 | I64 => 8,
        }
    }

    /// The begin marker for a column of this kind.
    pub fn marker(self) -> Marker {
        use ColumnKind::*;
        match self {
            U8 => Marker::ColU8,
            U16 => Marker::ColU16,
            U32 => Marker::ColU32,
            U64 => Marker::ColU64,
            I8 => Marker::ColI8,
            I16 => Marker::ColI16,
            I32 => Marker::ColI32,
            I64 => Marker::ColI64,
            Float => Marker::ColFloat,
            Bool => Marker::ColBool,
        }
    }

    /// Encode the null sentinel for this kind into `out` (LE).
    /// Unsigned kinds use the type's MAX, signed kinds the type's MIN,
    /// float a fixed quiet NaN, boolean the value 2.
    pub fn write_null_sentinel(self, out: &mut [u8]) {
        use ColumnKind::*;
        let w = self.width();
        match self {
            U8 | U16 | U32 | U64 => out[..w].fill(0xff),
            I8 => out[0] = i8::MIN as u8,
            I16 => out[..2].copy_from_slice(&i16::MIN.to_le_bytes()),
            I32 => out[..4].copy_from_slice(&i32::MIN.to_le_bytes()),
            I64 => out[..8].copy_from_slice(&i64::MIN.to_le_bytes()),
            Float => out[..4].copy_from_slice(&FLOAT_NULL_BITS.to_le_bytes()),
            Bool => out[0] = BOOL_NULL,
        }
    }

    /// True if the `width()` bytes at `slot` hold this kind's null sentinel.
    pub fn is_null_sentinel(self, slot: &[u8]) -> bool {
        use ColumnKind::*;
        match self {
            U8 | U16 | U32 | U64 => slot[..self.width()].iter().all(|&b| b == 0xff),
            I8 => slot[0] == i8::MIN as u8,
            I16 => slot[..2] == i16::MIN.to_le_bytes(),
            I32 => slot[..4] == i32::MIN.to_le_bytes(),
            I64 => slot[..8] == i64::MIN.to_le_bytes(),
            Float => slot[..4] == FLOAT_NULL_BITS.to_le_bytes(),
            Bool => slot[0] == BOOL_NULL,
        }
    }

    pub fn is_unsigned(self) -> bool {
        use ColumnKind::*;
        matches!(self, U8 | U16 | U32 | U64)
    }

    pub fn is_signed(self) -> bool {
        use ColumnKind::*;
        matches!(self, I8 | I16 | I32 | I64)
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_byte_roundtrip() {
        for byte in 0..=255u8 {
            if let Some(m) = Marker::from_u8(byte) {
                assert_eq!(m.as_u8(), byte);
            }
        }
        assert_eq!(Marker::from_u8(0x00), None);
        assert_eq!(Marker::from_u8(b'z'), None);
        assert!(Marker::try_from_u8(0x00).is_err());
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(Marker::Null.fixed_value_size(), Some(0));
        assert_eq!(Marker::True.fixed_value_size(), Some(0));
        assert_eq!(Marker::U8.fixed_value_size(), Some(1));
        assert_eq!(Marker::I16.fixed_value_size(), Some(2));
        assert_eq!(Marker::U32.fixed_value_size(), Some(4));
        assert_eq!(Marker::Float.fixed_value_size(), Some(4));
        assert_eq!(Marker::I64.fixed_value_size(), Some(8));
        assert_eq!(Marker::String.fixed_value_size(), None);
        assert_eq!(Marker::ArrayBegin.fixed_value_size(), None);
    }

    #[test]
    fn test_container_classification() {
        assert!(Marker::ArrayBegin.is_container_begin());
        assert!(Marker::ObjectBegin.is_container_begin());
        assert!(Marker::ColU8.is_container_begin());
        assert!(Marker::ArraySortedSet.is_container_begin());
        assert!(!Marker::ArrayEnd.is_container_begin());
        assert!(!Marker::String.is_container_begin());
    }

    #[test]
    fn test_derived_projection() {
        assert_eq!(Marker::ArraySortedMultiset.base_kind(), Marker::ArrayBegin);
        assert_eq!(Marker::ArrayUnsortedSet.base_kind(), Marker::ArrayBegin);
        assert_eq!(Marker::ObjectSortedMap.base_kind(), Marker::ObjectBegin);
        assert_eq!(Marker::ArrayBegin.base_kind(), Marker::ArrayBegin);
        assert_eq!(Marker::ColU16.base_kind(), Marker::ColU16);

        assert_eq!(Marker::ArrayBegin.derived_kind(), Some(DerivedKind::UnsortedMultiset));
        assert_eq!(Marker::ArraySortedSet.derived_kind(), Some(DerivedKind::SortedSet));
        assert_eq!(Marker::ObjectUnsortedMap.derived_kind(), Some(DerivedKind::UnsortedSet));
        assert_eq!(Marker::String.derived_kind(), None);
    }

    #[test]
    fn test_end_markers() {
        assert_eq!(Marker::ArrayBegin.end_marker(), Some(Marker::ArrayEnd));
        assert_eq!(Marker::ArraySortedSet.end_marker(), Some(Marker::ArrayEnd));
        assert_eq!(Marker::ObjectUnsortedMap.end_marker(), Some(Marker::ObjectEnd));
        assert_eq!(Marker::ColFloat.end_marker(), Some(Marker::ColEnd));
        assert_eq!(Marker::U8.end_marker(), None);
    }

    #[test]
    fn test_column_widths() {
        assert_eq!(ColumnKind::U8.width(), 1);
        assert_eq!(ColumnKind::I16.width(), 2);
        assert_eq!(ColumnKind::Float.width(), 4);
        assert_eq!(ColumnKind::U64.width(), 8);
        assert_eq!(ColumnKind::Bool.width(), 1);
    }

    #[test]
    fn test_column_null_sentinels() {
        let mut slot = [0u8; 8];
        ColumnKind::U8.write_null_sentinel(&mut slot);
        assert_eq!(slot[0], 0xff);
        assert!(ColumnKind::U8.is_null_sentinel(&slot));

        ColumnKind::I32.write_null_sentinel(&mut slot);
        assert_eq!(&slot[..4], &i32::MIN.to_le_bytes());
        assert!(ColumnKind::I32.is_null_sentinel(&slot));
        assert!(!ColumnKind::I32.is_null_sentinel(&42i32.to_le_bytes()));

        ColumnKind::Float.write_null_sentinel(&mut slot);
        assert!(f32::from_le_bytes(slot[..4].try_into().unwrap()).is_nan());

        ColumnKind::Bool.write_null_sentinel(&mut slot);
        assert_eq!(slot[0], BOOL_NULL);
    }

    #[test]
    fn test_column_marker_roundtrip() {
        for kind in [
            ColumnKind::U8,
            ColumnKind::U16,
            ColumnKind::U32,
            ColumnKind::U64,
            ColumnKind::I8,
            ColumnKind::I16,
            ColumnKind::I32,
            ColumnKind::I64,
            ColumnKind::Float,
            ColumnKind::Bool,
        ] {
            assert_eq!(kind.marker().column_kind(), Some(kind));
        }
    }
}
