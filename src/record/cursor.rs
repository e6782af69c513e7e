//! Position-based cursors over a record buffer.
//!
//! Cursors walk container regions and yield typed fields without copying.
//! A cursor borrows the buffer read-only; the field-access value bag it
//! hands out carries the field type and a view over the payload bytes, and
//! can lazily open child cursors for nested containers.
//!
//! A cursor that hits a structural error (marker outside the closed set,
//! region overrun) latches the error: `next` keeps returning `false` and
//! `field` keeps returning the same error until the cursor is dropped.

use crate::error::{RecordError, Result};
use crate::record::containers::{self, Frame};
use crate::record::marker::{ColumnKind, Marker, BOOL_FALSE, BOOL_TRUE, BOOL_NULL};
use crate::record::scalars::{self, BinaryRef};

// ── Field access ───────────────────────────────────────────────────

/// The opaque handle for the field a cursor is currently positioned on:
/// its type marker, buffer position, and typed payload accessors.
#[derive(Debug, Clone, Copy)]
pub struct FieldAccess<'r> {
    buf: &'r [u8],
    marker: Marker,
    /// Offset of the type marker byte.
    off: usize,
}

impl<'r> FieldAccess<'r> {
    pub(crate) fn at(buf: &'r [u8], off: usize) -> Result<Self> {
        let byte = *buf.get(off).ok_or(RecordError::OutOfBounds(off))?;
        let marker = Marker::try_from_u8(byte)?;
        Ok(Self { buf, marker, off })
    }

    /// The field's exact type marker.
    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Offset of the type marker byte in the record buffer.
    pub fn tell(&self) -> usize {
        self.off
    }

    /// Offset of the first payload byte.
    pub fn payload_off(&self) -> usize {
        self.off + 1
    }

    /// Total encoded length (marker + payload).
    pub fn total_len(&self) -> Result<usize> {
        containers::field_len(self.buf, self.off)
    }

    pub fn is_null(&self) -> bool {
        self.marker == Marker::Null
    }

    fn mismatch(&self, expected: &'static str) -> RecordError {
        RecordError::TypeMismatch { expected, found: self.marker.type_name() }
    }

    // ── Typed accessors ────────────────────────────────────────────

    pub fn as_bool(&self) -> Result<bool> {
        match self.marker {
            Marker::True => Ok(true),
            Marker::False => Ok(false),
            _ => Err(self.mismatch("boolean")),
        }
    }

    pub fn as_u8(&self) -> Result<u8> {
        match self.marker {
            Marker::U8 => Ok(scalars::decode_unsigned(self.buf, self.payload_off(), self.marker)? as u8),
            _ => Err(self.mismatch("u8")),
        }
    }

    pub fn as_u16(&self) -> Result<u16> {
        match self.marker {
            Marker::U16 => Ok(scalars::decode_unsigned(self.buf, self.payload_off(), self.marker)? as u16),
            _ => Err(self.mismatch("u16")),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        match self.marker {
            Marker::U32 => Ok(scalars::decode_unsigned(self.buf, self.payload_off(), self.marker)? as u32),
            _ => Err(self.mismatch("u32")),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self.marker {
            Marker::U64 => scalars::decode_unsigned(self.buf, self.payload_off(), self.marker),
            _ => Err(self.mismatch("u64")),
        }
    }

    pub fn as_i8(&self) -> Result<i8> {
        match self.marker {
            Marker::I8 => Ok(scalars::decode_signed(self.buf, self.payload_off(), self.marker)? as i8),
            _ => Err(self.mismatch("i8")),
        }
    }

    pub fn as_i16(&self) -> Result<i16> {
        match self.marker {
            Marker::I16 => Ok(scalars::decode_signed(self.buf, self.payload_off(), self.marker)? as i16),
            _ => Err(self.mismatch("i16")),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self.marker {
            Marker::I32 => Ok(scalars::decode_signed(self.buf, self.payload_off(), self.marker)? as i32),
            _ => Err(self.mismatch("i32")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self.marker {
            Marker::I64 => scalars::decode_signed(self.buf, self.payload_off(), self.marker),
            _ => Err(self.mismatch("i64")),
        }
    }

    /// Any unsigned integer width, widened to u64.
    pub fn as_unsigned(&self) -> Result<u64> {
        match self.marker {
            Marker::U8 | Marker::U16 | Marker::U32 | Marker::U64 => {
                scalars::decode_unsigned(self.buf, self.payload_off(), self.marker)
            }
            _ => Err(self.mismatch("unsigned integer")),
        }
    }

    /// Any signed integer width, sign-extended to i64.
    pub fn as_signed(&self) -> Result<i64> {
        match self.marker {
            Marker::I8 | Marker::I16 | Marker::I32 | Marker::I64 => {
                scalars::decode_signed(self.buf, self.payload_off(), self.marker)
            }
            _ => Err(self.mismatch("signed integer")),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self.marker {
            Marker::Float => {
                let at = self.payload_off();
                let end = at + 4;
                if end > self.buf.len() {
                    return Err(RecordError::OutOfBounds(end));
                }
                Ok(f32::from_le_bytes(self.buf[at..end].try_into().unwrap()))
            }
            _ => Err(self.mismatch("float")),
        }
    }

    pub fn as_string(&self) -> Result<&'r str> {
        match self.marker {
            Marker::String => Ok(scalars::read_string_payload(self.buf, self.payload_off())?.0),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn as_binary(&self) -> Result<BinaryRef<'r>> {
        match self.marker {
            Marker::Binary | Marker::UserBinary => {
                Ok(scalars::read_binary_payload(self.buf, self.payload_off(), self.marker)?.0)
            }
            _ => Err(self.mismatch("binary")),
        }
    }

    // ── Container descenders ───────────────────────────────────────

    /// Open a child cursor over an array field (base or derived kind).
    pub fn as_array(&self) -> Result<ArrayCursor<'r>> {
        if !self.marker.is_array_begin() {
            return Err(self.mismatch("array"));
        }
        ArrayCursor::open_at(self.buf, self.off)
    }

    /// Open a child cursor over an object field (base or derived kind).
    pub fn as_object(&self) -> Result<ObjectCursor<'r>> {
        if !self.marker.is_object_begin() {
            return Err(self.mismatch("object"));
        }
        ObjectCursor::open_at(self.buf, self.off)
    }

    /// Open a child cursor over a column field.
    pub fn as_column(&self) -> Result<ColumnCursor<'r>> {
        if !self.marker.is_column_begin() {
            return Err(self.mismatch("column"));
        }
        ColumnCursor::open_at(self.buf, self.off)
    }
}

// ── Array cursor ───────────────────────────────────────────────────

/// Read cursor over an array container.
#[derive(Debug, Clone)]
pub struct ArrayCursor<'r> {
    buf: &'r [u8],
    frame: Frame,
    /// Current element index; `None` before the first `next`.
    idx: Option<u64>,
    /// Offset of the current element's type marker.
    pos: usize,
    history: Vec<(usize, Option<u64>)>,
    err: Option<RecordError>,
}

impl<'r> ArrayCursor<'r> {
    /// Open a cursor on the array container beginning at `at`.
    pub fn open_at(buf: &'r [u8], at: usize) -> Result<Self> {
        let frame = Frame::parse_at(buf, at)?;
        if !frame.marker.is_array_begin() {
            return Err(RecordError::TypeMismatch {
                expected: "array",
                found: frame.marker.type_name(),
            });
        }
        Ok(Self { buf, frame, idx: None, pos: frame.region_start, history: Vec::new(), err: None })
    }

    /// The array's exact begin marker (base or derived).
    pub fn marker(&self) -> Marker {
        self.frame.marker
    }

    /// Number of elements.
    pub fn len(&self) -> u64 {
        self.frame.count
    }

    pub fn is_empty(&self) -> bool {
        self.frame.count == 0
    }

    /// Advance to the next element. Returns `false` past the last element
    /// or after a latched error.
    pub fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        let next_idx = match self.idx {
            None => 0,
            Some(i) if i >= self.frame.count => return false,
            Some(i) => {
                match containers::field_len(self.buf, self.pos) {
                    Ok(len) => self.pos += len,
                    Err(e) => {
                        self.err = Some(e);
                        return false;
                    }
                }
                i + 1
            }
        };
        if next_idx >= self.frame.count {
            self.idx = Some(next_idx);
            return false;
        }
        self.idx = Some(next_idx);
        true
    }

    /// Index of the current element.
    pub fn index(&self) -> Option<u64> {
        self.idx.filter(|&i| i < self.frame.count)
    }

    /// Offset of the current element's type marker.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// The latched error, if the cursor failed structurally.
    pub fn error(&self) -> Option<&RecordError> {
        self.err.as_ref()
    }

    /// Field access for the current element.
    pub fn field(&self) -> Result<FieldAccess<'r>> {
        if let Some(e) = &self.err {
            return Err(e.clone());
        }
        match self.index() {
            Some(_) => FieldAccess::at(self.buf, self.pos),
            None => Err(RecordError::InvalidCursor("no current element")),
        }
    }

    /// Exact type marker of the current element.
    pub fn field_type(&self) -> Result<Marker> {
        Ok(self.field()?.marker())
    }

    /// Push the current position onto the cursor's history stack.
    pub fn save(&mut self) {
        self.history.push((self.pos, self.idx));
    }

    /// Pop the history stack and rewind to the popped position.
    pub fn restore(&mut self) -> Result<()> {
        let (pos, idx) = self
            .history
            .pop()
            .ok_or_else(|| RecordError::Internal("cursor restore without save".into()))?;
        self.pos = pos;
        self.idx = idx;
        self.err = None;
        Ok(())
    }
}

// ── Object cursor ──────────────────────────────────────────────────

/// Read cursor over an object container, yielding (key, value) pairs in
/// insertion order. Duplicate keys are preserved.
#[derive(Debug, Clone)]
pub struct ObjectCursor<'r> {
    buf: &'r [u8],
    frame: Frame,
    idx: Option<u64>,
    /// Offset of the current pair's key-length varint.
    pos: usize,
    /// Offset of the current pair's value marker.
    value_off: usize,
    history: Vec<(usize, usize, Option<u64>)>,
    err: Option<RecordError>,
}

impl<'r> ObjectCursor<'r> {
    /// Open a cursor on the object container beginning at `at`.
    pub fn open_at(buf: &'r [u8], at: usize) -> Result<Self> {
        let frame = Frame::parse_at(buf, at)?;
        if !frame.marker.is_object_begin() {
            return Err(RecordError::TypeMismatch {
                expected: "object",
                found: frame.marker.type_name(),
            });
        }
        Ok(Self {
            buf,
            frame,
            idx: None,
            pos: frame.region_start,
            value_off: frame.region_start,
            history: Vec::new(),
            err: None,
        })
    }

    /// The object's exact begin marker (base or derived).
    pub fn marker(&self) -> Marker {
        self.frame.marker
    }

    /// Number of properties.
    pub fn len(&self) -> u64 {
        self.frame.count
    }

    pub fn is_empty(&self) -> bool {
        self.frame.count == 0
    }

    /// Advance to the next property.
    pub fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        let next_idx = match self.idx {
            None => 0,
            Some(i) if i >= self.frame.count => return false,
            Some(i) => {
                match containers::pair_len(self.buf, self.pos) {
                    Ok(len) => self.pos += len,
                    Err(e) => {
                        self.err = Some(e);
                        return false;
                    }
                }
                i + 1
            }
        };
        if next_idx >= self.frame.count {
            self.idx = Some(next_idx);
            return false;
        }
        // Locate the value marker behind the key.
        match scalars::string_payload_len(self.buf, self.pos) {
            Ok(key_len) => self.value_off = self.pos + key_len,
            Err(e) => {
                self.err = Some(e);
                return false;
            }
        }
        self.idx = Some(next_idx);
        true
    }

    pub fn index(&self) -> Option<u64> {
        self.idx.filter(|&i| i < self.frame.count)
    }

    /// Offset of the current pair's key-length varint.
    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn error(&self) -> Option<&RecordError> {
        self.err.as_ref()
    }

    /// Key of the current property.
    pub fn key_name(&self) -> Result<&'r str> {
        if let Some(e) = &self.err {
            return Err(e.clone());
        }
        match self.index() {
            Some(_) => Ok(scalars::read_string_payload(self.buf, self.pos)?.0),
            None => Err(RecordError::InvalidCursor("no current property")),
        }
    }

    /// Field access for the current property's value.
    pub fn field(&self) -> Result<FieldAccess<'r>> {
        if let Some(e) = &self.err {
            return Err(e.clone());
        }
        match self.index() {
            Some(_) => FieldAccess::at(self.buf, self.value_off),
            None => Err(RecordError::InvalidCursor("no current property")),
        }
    }

    /// Exact type marker of the current property's value.
    pub fn field_type(&self) -> Result<Marker> {
        Ok(self.field()?.marker())
    }

    pub fn save(&mut self) {
        self.history.push((self.pos, self.value_off, self.idx));
    }

    pub fn restore(&mut self) -> Result<()> {
        let (pos, value_off, idx) = self
            .history
            .pop()
            .ok_or_else(|| RecordError::Internal("cursor restore without save".into()))?;
        self.pos = pos;
        self.value_off = value_off;
        self.idx = idx;
        self.err = None;
        Ok(())
    }
}

// ── Column cursor ──────────────────────────────────────────────────

/// One decoded column element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnEntry {
    Null,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f32),
}

/// Read cursor over a column container: densely packed fixed-width values
/// with sentinel-encoded nulls.
#[derive(Debug, Clone)]
pub struct ColumnCursor<'r> {
    buf: &'r [u8],
    frame: Frame,
    kind: ColumnKind,
}

impl<'r> ColumnCursor<'r> {
    /// Open a cursor on the column container beginning at `at`.
    pub fn open_at(buf: &'r [u8], at: usize) -> Result<Self> {
        let frame = Frame::parse_at(buf, at)?;
        let kind = frame.column_kind().ok_or(RecordError::TypeMismatch {
            expected: "column",
            found: frame.marker.type_name(),
        })?;
        Ok(Self { buf, frame, kind })
    }

    /// The column's begin marker and element count.
    pub fn values_info(&self) -> (Marker, u64) {
        (self.frame.marker, self.frame.count)
    }

    /// The column's scalar kind.
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// Number of live values.
    pub fn len(&self) -> u64 {
        self.frame.count
    }

    pub fn is_empty(&self) -> bool {
        self.frame.count == 0
    }

    /// The dense payload: exactly `len() * width` bytes.
    pub fn values_bytes(&self) -> &'r [u8] {
        let start = self.frame.region_start;
        let end = start + self.frame.count as usize * self.kind.width();
        &self.buf[start..end]
    }

    fn slot(&self, i: u64) -> Result<&'r [u8]> {
        if i >= self.frame.count {
            return Err(RecordError::NotFound(format!(
                "column value {} of {}",
                i, self.frame.count
            )));
        }
        let w = self.kind.width();
        let start = self.frame.region_start + i as usize * w;
        Ok(&self.buf[start..start + w])
    }

    /// True if value `i` is the null sentinel.
    pub fn value_is_null(&self, i: u64) -> Result<bool> {
        Ok(self.kind.is_null_sentinel(self.slot(i)?))
    }

    /// Decode value `i`.
    pub fn get(&self, i: u64) -> Result<ColumnEntry> {
        let slot = self.slot(i)?;
        if self.kind.is_null_sentinel(slot) {
            return Ok(ColumnEntry::Null);
        }
        Ok(match self.kind {
            ColumnKind::Bool => match slot[0] {
                BOOL_FALSE => ColumnEntry::Bool(false),
                BOOL_TRUE => ColumnEntry::Bool(true),
                BOOL_NULL => ColumnEntry::Null,
                other => {
                    return Err(RecordError::Corrupted(format!(
                        "boolean column slot holds 0x{:02x}",
                        other
                    )))
                }
            },
            ColumnKind::Float => {
                ColumnEntry::Float(f32::from_le_bytes(slot[..4].try_into().unwrap()))
            }
            k if k.is_unsigned() => {
                let mut le = [0u8; 8];
                le[..k.width()].copy_from_slice(slot);
                ColumnEntry::Unsigned(u64::from_le_bytes(le))
            }
            k => {
                let negative = slot[k.width() - 1] & 0x80 != 0;
                let mut le = [if negative { 0xff } else { 0 }; 8];
                le[..k.width()].copy_from_slice(slot);
                ColumnEntry::Signed(i64::from_le_bytes(le))
            }
        })
    }

    /// Iterate over all values.
    pub fn iter(&self) -> impl Iterator<Item = Result<ColumnEntry>> + '_ {
        (0..self.frame.count).map(move |i| self.get(i))
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membuf::MemBuf;
    use crate::varint;

    /// Hand-build an array container holding the given pre-encoded fields.
    fn build_array(fields: &[&[u8]]) -> Vec<u8> {
        let mut buf = MemBuf::new();
        let used: usize = fields.iter().map(|f| f.len()).sum();
        buf.write_byte(b'[').unwrap();
        varint::write_varint(&mut buf, fields.len() as u64).unwrap();
        varint::write_varint(&mut buf, used as u64).unwrap();
        for f in fields {
            buf.write(f).unwrap();
        }
        buf.write_byte(b']').unwrap();
        buf.into_vec()
    }

    #[test]
    fn test_array_cursor_walks_elements() {
        let bytes = build_array(&[&[b'c', 0x01], &[b's', 0x02, b'h', b'i'], &[b'n'], &[b't']]);
        let mut cur = ArrayCursor::open_at(&bytes, 0).unwrap();
        assert_eq!(cur.len(), 4);

        assert!(cur.next());
        assert_eq!(cur.field_type().unwrap(), Marker::U8);
        assert_eq!(cur.field().unwrap().as_u8().unwrap(), 1);

        assert!(cur.next());
        assert_eq!(cur.field().unwrap().as_string().unwrap(), "hi");

        assert!(cur.next());
        assert!(cur.field().unwrap().is_null());

        assert!(cur.next());
        assert!(cur.field().unwrap().as_bool().unwrap());

        assert!(!cur.next());
        assert!(cur.field().is_err());
        assert!(cur.error().is_none());
    }

    #[test]
    fn test_array_cursor_typed_mismatch() {
        let bytes = build_array(&[&[b'c', 0x07]]);
        let mut cur = ArrayCursor::open_at(&bytes, 0).unwrap();
        assert!(cur.next());
        let field = cur.field().unwrap();
        assert_eq!(field.as_u8().unwrap(), 7);
        assert!(matches!(field.as_u16().unwrap_err(), RecordError::TypeMismatch { .. }));
        assert!(matches!(field.as_string().unwrap_err(), RecordError::TypeMismatch { .. }));
        assert!(matches!(field.as_array().unwrap_err(), RecordError::TypeMismatch { .. }));
    }

    #[test]
    fn test_array_cursor_save_restore() {
        let bytes = build_array(&[&[b'c', 0x01], &[b'c', 0x02], &[b'c', 0x03]]);
        let mut cur = ArrayCursor::open_at(&bytes, 0).unwrap();
        assert!(cur.next());
        cur.save();
        assert!(cur.next());
        assert!(cur.next());
        assert_eq!(cur.field().unwrap().as_u8().unwrap(), 3);

        cur.restore().unwrap();
        assert_eq!(cur.field().unwrap().as_u8().unwrap(), 1);
        assert!(cur.restore().is_err());
    }

    #[test]
    fn test_array_cursor_latches_error() {
        // Second element carries a marker outside the closed set.
        let bytes = build_array(&[&[b'c', 0x01], &[0x00, 0x00]]);
        let mut cur = ArrayCursor::open_at(&bytes, 0).unwrap();
        assert!(cur.next());
        assert!(cur.next()); // positions on the bad marker
        assert!(cur.field().is_err() || !cur.next());
        // Walking past the bad element fails and latches.
        assert!(!cur.next());
        assert!(cur.error().is_some() || cur.field().is_err());
    }

    #[test]
    fn test_nested_array_descend() {
        let inner = build_array(&[&[b'c', 0x05]]);
        let bytes = build_array(&[&[b't'], &inner]);
        let mut cur = ArrayCursor::open_at(&bytes, 0).unwrap();
        assert!(cur.next());
        assert!(cur.next());
        assert_eq!(cur.field_type().unwrap(), Marker::ArrayBegin);

        let mut child = cur.field().unwrap().as_array().unwrap();
        assert!(child.next());
        assert_eq!(child.field().unwrap().as_u8().unwrap(), 5);
        assert!(!child.next());
    }

    fn build_object(pairs: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = MemBuf::new();
        for (k, v) in pairs {
            varint::write_varint(&mut body, k.len() as u64).unwrap();
            body.write(k.as_bytes()).unwrap();
            body.write(v).unwrap();
        }
        let used = body.len();
        let mut buf = MemBuf::new();
        buf.write_byte(b'{').unwrap();
        varint::write_varint(&mut buf, pairs.len() as u64).unwrap();
        varint::write_varint(&mut buf, used as u64).unwrap();
        buf.write(body.as_slice()).unwrap();
        buf.write_byte(b'}').unwrap();
        buf.into_vec()
    }

    #[test]
    fn test_object_cursor_yields_pairs_in_order() {
        let bytes = build_object(&[("b", &[b'c', 0x02]), ("a", &[b'c', 0x01])]);
        let mut cur = ObjectCursor::open_at(&bytes, 0).unwrap();
        assert_eq!(cur.len(), 2);

        assert!(cur.next());
        assert_eq!(cur.key_name().unwrap(), "b");
        assert_eq!(cur.field().unwrap().as_u8().unwrap(), 2);

        assert!(cur.next());
        assert_eq!(cur.key_name().unwrap(), "a");
        assert_eq!(cur.field().unwrap().as_u8().unwrap(), 1);

        assert!(!cur.next());
    }

    #[test]
    fn test_object_cursor_duplicate_keys_preserved() {
        let bytes = build_object(&[("a", &[b'c', 0x01]), ("a", &[b'c', 0x02])]);
        let mut cur = ObjectCursor::open_at(&bytes, 0).unwrap();
        let mut seen = Vec::new();
        while cur.next() {
            seen.push((cur.key_name().unwrap().to_string(), cur.field().unwrap().as_u8().unwrap()));
        }
        assert_eq!(seen, vec![("a".to_string(), 1), ("a".to_string(), 2)]);
    }

    #[test]
    fn test_object_cursor_on_array_is_mismatch() {
        let bytes = build_array(&[]);
        assert!(matches!(
            ObjectCursor::open_at(&bytes, 0).unwrap_err(),
            RecordError::TypeMismatch { .. }
        ));
    }

    fn build_column(kind_marker: u8, count: u64, slots: &[u8]) -> Vec<u8> {
        let mut buf = MemBuf::new();
        buf.write_byte(kind_marker).unwrap();
        varint::write_varint(&mut buf, count).unwrap();
        varint::write_varint(&mut buf, count).unwrap();
        buf.write(slots).unwrap();
        buf.write_byte(b')').unwrap();
        buf.into_vec()
    }

    #[test]
    fn test_column_cursor_u8() {
        let bytes = build_column(b'1', 4, &[10, 20, 0xff, 40]);
        let col = ColumnCursor::open_at(&bytes, 0).unwrap();

        assert_eq!(col.values_info(), (Marker::ColU8, 4));
        assert_eq!(col.values_bytes(), &[10, 20, 0xff, 40]);
        assert!(!col.value_is_null(0).unwrap());
        assert!(col.value_is_null(2).unwrap());
        assert_eq!(col.get(0).unwrap(), ColumnEntry::Unsigned(10));
        assert_eq!(col.get(2).unwrap(), ColumnEntry::Null);
        assert_eq!(col.get(3).unwrap(), ColumnEntry::Unsigned(40));
        assert!(col.get(4).is_err());
    }

    #[test]
    fn test_column_cursor_i16_sign_extension() {
        let mut slots = Vec::new();
        slots.extend_from_slice(&(-5i16).to_le_bytes());
        slots.extend_from_slice(&i16::MIN.to_le_bytes());
        let bytes = build_column(b'6', 2, &slots);
        let col = ColumnCursor::open_at(&bytes, 0).unwrap();

        assert_eq!(col.get(0).unwrap(), ColumnEntry::Signed(-5));
        assert_eq!(col.get(1).unwrap(), ColumnEntry::Null);
    }

    #[test]
    fn test_column_cursor_bool() {
        let bytes = build_column(b'B', 3, &[BOOL_TRUE, BOOL_FALSE, BOOL_NULL]);
        let col = ColumnCursor::open_at(&bytes, 0).unwrap();
        let entries: Vec<_> = col.iter().collect::<Result<_>>().unwrap();
        assert_eq!(
            entries,
            vec![ColumnEntry::Bool(true), ColumnEntry::Bool(false), ColumnEntry::Null]
        );
    }

    #[test]
    fn test_column_cursor_float_null() {
        let mut slots = Vec::new();
        slots.extend_from_slice(&3.5f32.to_le_bytes());
        slots.extend_from_slice(&crate::record::marker::FLOAT_NULL_BITS.to_le_bytes());
        let bytes = build_column(b'R', 2, &slots);
        let col = ColumnCursor::open_at(&bytes, 0).unwrap();
        assert_eq!(col.get(0).unwrap(), ColumnEntry::Float(3.5));
        assert_eq!(col.get(1).unwrap(), ColumnEntry::Null);
    }
}
