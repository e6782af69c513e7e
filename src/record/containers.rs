//! Container framing: begin/end markers, count and capacity varints,
//! element-region accounting.
//!
//! ```text
//! array:  '[' varint nelems  varint cap_bytes  <elements, free 0x00...> ']'
//! object: '{' varint npairs  varint cap_bytes  <pairs,    free 0x00...> '}'
//! column: <kind-marker> varint nvalues varint cap_values <slots> ')'
//! ```
//!
//! `cap` is the total size of the element region (bytes for arrays and
//! objects, value slots for columns); the end marker sits exactly one
//! region past the capacity varint. Live elements are contiguous at the
//! front of the region; the remainder is zero-filled (0x00 is not a valid
//! marker, it is the empty-slot byte).

use crate::error::{RecordError, Result};
use crate::membuf::MemBuf;
use crate::record::marker::{ColumnKind, Marker};
use crate::record::scalars;
use crate::varint;

// ── Frame ──────────────────────────────────────────────────────────

/// Parsed framing of one container at a fixed buffer position.
///
/// A frame is a snapshot: any mutation of the buffer at or before
/// `region_start` invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Exact begin marker (may be a derived variant).
    pub marker: Marker,
    /// Offset of the begin marker byte.
    pub begin: usize,
    /// Offset of the element/pair/value count varint.
    pub count_off: usize,
    /// Decoded count.
    pub count: u64,
    /// Offset of the capacity varint.
    pub cap_off: usize,
    /// Decoded capacity: region bytes for arrays/objects, value slots for
    /// columns.
    pub cap: u64,
    /// Offset of the first element byte.
    pub region_start: usize,
}

impl Frame {
    /// Parse the framing of the container beginning at `at`.
    pub fn parse_at(bytes: &[u8], at: usize) -> Result<Frame> {
        let marker_byte = *bytes.get(at).ok_or(RecordError::OutOfBounds(at))?;
        let marker = Marker::try_from_u8(marker_byte)?;
        if !marker.is_container_begin() {
            return Err(RecordError::TypeMismatch {
                expected: "container",
                found: marker.type_name(),
            });
        }
        let count_off = at + 1;
        let (count, count_len) = varint::decode_at(bytes, count_off)?;
        let cap_off = count_off + count_len;
        let (cap, cap_len) = varint::decode_at(bytes, cap_off)?;
        let region_start = cap_off + cap_len;

        let frame = Frame { marker, begin: at, count_off, count, cap_off, cap, region_start };
        let end = frame.end_off();
        let end_byte = *bytes.get(end).ok_or(RecordError::OutOfBounds(end))?;
        if end_byte != marker.end_marker().expect("container marker").as_u8() {
            return Err(RecordError::Corrupted(format!(
                "container at {} missing end marker at {}",
                at, end
            )));
        }
        if marker.is_column_begin() && count > cap {
            return Err(RecordError::Corrupted(format!(
                "column at {} has count {} above capacity {}",
                at, count, cap
            )));
        }
        Ok(frame)
    }

    /// The column scalar kind, for column frames.
    pub fn column_kind(&self) -> Option<ColumnKind> {
        self.marker.column_kind()
    }

    /// Element-region size in bytes.
    pub fn region_len(&self) -> usize {
        match self.column_kind() {
            Some(kind) => self.cap as usize * kind.width(),
            None => self.cap as usize,
        }
    }

    /// Offset of the end marker byte (one past the element region).
    pub fn end_off(&self) -> usize {
        self.region_start + self.region_len()
    }

    /// Total encoded size of the container including both markers.
    pub fn total_len(&self) -> usize {
        self.end_off() + 1 - self.begin
    }

    /// Shift every stored offset by `delta` (bytes inserted or removed
    /// before `begin`).
    pub fn shifted(mut self, delta: i64) -> Frame {
        self.begin = self.begin.wrapping_add_signed(delta as isize);
        self.count_off = self.count_off.wrapping_add_signed(delta as isize);
        self.cap_off = self.cap_off.wrapping_add_signed(delta as isize);
        self.region_start = self.region_start.wrapping_add_signed(delta as isize);
        self
    }
}

// ── Frame writing ──────────────────────────────────────────────────

/// Write an empty container skeleton at the buffer cursor: begin marker,
/// count varint 0, capacity varint, zeroed region of `cap_hint` (bytes or
/// value slots), end marker. Leaves the cursor past the end marker and
/// returns the parsed frame.
pub fn write_empty_frame(buf: &mut MemBuf, marker: Marker, cap_hint: u64) -> Result<Frame> {
    debug_assert!(marker.is_container_begin());
    let begin = buf.tell();
    buf.write_byte(marker.as_u8())?;
    let count_off = buf.tell();
    varint::write_varint(buf, 0)?;
    let cap_off = buf.tell();
    let cap_len = varint::write_varint(buf, cap_hint)?;
    let region_start = cap_off + cap_len;
    let region_len = match marker.column_kind() {
        Some(kind) => cap_hint as usize * kind.width(),
        None => cap_hint as usize,
    };
    buf.write_zeros(region_len)?;
    buf.write_byte(marker.end_marker().expect("container marker").as_u8())?;
    Ok(Frame {
        marker,
        begin,
        count_off,
        count: 0,
        cap_off,
        cap: cap_hint,
        region_start,
    })
}

// ── Field lengths ──────────────────────────────────────────────────

/// Total encoded length of the field starting at `at` (type marker plus
/// payload). For containers this spans the whole frame.
pub fn field_len(bytes: &[u8], at: usize) -> Result<usize> {
    let marker_byte = *bytes.get(at).ok_or(RecordError::OutOfBounds(at))?;
    let marker = Marker::try_from_u8(marker_byte)?;
    if let Some(fixed) = marker.fixed_value_size() {
        let total = 1 + fixed;
        if at + total > bytes.len() {
            return Err(RecordError::OutOfBounds(at + total));
        }
        return Ok(total);
    }
    match marker {
        Marker::String => Ok(1 + scalars::string_payload_len(bytes, at + 1)?),
        Marker::Binary | Marker::UserBinary => {
            Ok(1 + scalars::binary_payload_len(bytes, at + 1, marker)?)
        }
        m if m.is_container_begin() => Ok(Frame::parse_at(bytes, at)?.total_len()),
        other => Err(RecordError::Corrupted(format!(
            "marker '{}' cannot start a field",
            other.as_u8() as char
        ))),
    }
}

/// Total encoded length of an object pair at `at` (key string + value
/// field).
pub fn pair_len(bytes: &[u8], at: usize) -> Result<usize> {
    let key_len = scalars::string_payload_len(bytes, at)?;
    let value_len = field_len(bytes, at + key_len)?;
    Ok(key_len + value_len)
}

/// Bytes occupied by the live elements of a container (walks the region).
pub fn used_bytes(bytes: &[u8], frame: &Frame) -> Result<usize> {
    if let Some(kind) = frame.column_kind() {
        return Ok(frame.count as usize * kind.width());
    }
    let is_object = frame.marker.is_object_begin();
    let mut off = frame.region_start;
    for _ in 0..frame.count {
        let len = if is_object { pair_len(bytes, off)? } else { field_len(bytes, off)? };
        off += len;
        if off > frame.end_off() {
            return Err(RecordError::Corrupted(format!(
                "container at {} overruns its region",
                frame.begin
            )));
        }
    }
    Ok(off - frame.region_start)
}

/// Offset of element `idx` inside an array/object frame (pair offset for
/// objects), or of the first free byte when `idx == count`.
pub fn element_offset(bytes: &[u8], frame: &Frame, idx: u64) -> Result<usize> {
    if idx > frame.count {
        return Err(RecordError::NotFound(format!(
            "element {} of {} in container at {}",
            idx, frame.count, frame.begin
        )));
    }
    if let Some(kind) = frame.column_kind() {
        return Ok(frame.region_start + idx as usize * kind.width());
    }
    let is_object = frame.marker.is_object_begin();
    let mut off = frame.region_start;
    for _ in 0..idx {
        let len = if is_object { pair_len(bytes, off)? } else { field_len(bytes, off)? };
        off += len;
    }
    Ok(off)
}

// ── Structural validation ──────────────────────────────────────────

/// Recursively validate the container starting at `at`: every marker in
/// the closed set, counts consistent with the region, end markers present,
/// free space zero-filled. Returns the container's total length.
pub fn validate_container(bytes: &[u8], at: usize) -> Result<usize> {
    let frame = Frame::parse_at(bytes, at)?;
    if frame.column_kind().is_some() {
        // Column regions are dense slots; nothing nested to check.
        return Ok(frame.total_len());
    }
    let is_object = frame.marker.is_object_begin();
    let mut off = frame.region_start;
    for _ in 0..frame.count {
        if is_object {
            let key_len = scalars::string_payload_len(bytes, off)?;
            scalars::read_string_payload(bytes, off)?;
            off += key_len;
        }
        let marker = Marker::try_from_u8(bytes[off])?;
        let len = if marker.is_container_begin() {
            validate_container(bytes, off)?
        } else {
            field_len(bytes, off)?
        };
        off += len;
        if off > frame.end_off() {
            return Err(RecordError::Corrupted(format!(
                "container at {} overruns its region",
                at
            )));
        }
    }
    if bytes[off..frame.end_off()].iter().any(|&b| b != 0) {
        return Err(RecordError::Corrupted(format!(
            "container at {} has non-zero free space",
            at
        )));
    }
    Ok(frame.total_len())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_parse_empty_array() {
        let mut buf = MemBuf::new();
        let frame = write_empty_frame(&mut buf, Marker::ArrayBegin, 8).unwrap();
        // '[' count=0 cap=8 region(8 zeros) ']'
        assert_eq!(buf.len(), 1 + 1 + 1 + 8 + 1);
        assert_eq!(buf.as_slice()[0], b'[');
        assert_eq!(buf.as_slice()[buf.len() - 1], b']');

        let parsed = Frame::parse_at(buf.as_slice(), 0).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.count, 0);
        assert_eq!(parsed.cap, 8);
        assert_eq!(parsed.region_len(), 8);
        assert_eq!(parsed.total_len(), buf.len());
    }

    #[test]
    fn test_column_region_is_slot_scaled() {
        let mut buf = MemBuf::new();
        let frame = write_empty_frame(&mut buf, Marker::ColU32, 3).unwrap();
        assert_eq!(frame.region_len(), 12);
        assert_eq!(buf.len(), 1 + 1 + 1 + 12 + 1);
        assert_eq!(buf.as_slice()[buf.len() - 1], b')');
    }

    #[test]
    fn test_parse_rejects_missing_end_marker() {
        let mut buf = MemBuf::new();
        write_empty_frame(&mut buf, Marker::ObjectBegin, 4).unwrap();
        let last = buf.len() - 1;
        buf.patch(last, &[b'X']).unwrap();
        assert!(matches!(
            Frame::parse_at(buf.as_slice(), 0).unwrap_err(),
            RecordError::Corrupted(_)
        ));
    }

    #[test]
    fn test_parse_rejects_non_container() {
        let bytes = [b'c', 0x01];
        assert!(matches!(
            Frame::parse_at(&bytes, 0).unwrap_err(),
            RecordError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_field_len_scalars() {
        assert_eq!(field_len(&[b'n'], 0).unwrap(), 1);
        assert_eq!(field_len(&[b't'], 0).unwrap(), 1);
        assert_eq!(field_len(&[b'c', 0x01], 0).unwrap(), 2);
        assert_eq!(field_len(&[b'd', 0x2c, 0x01], 0).unwrap(), 3);
        assert_eq!(field_len(&[b'L', 0, 0, 0, 0, 0, 0, 0, 0], 0).unwrap(), 9);
        assert_eq!(field_len(&[b's', 0x02, b'h', b'i'], 0).unwrap(), 4);
    }

    #[test]
    fn test_field_len_rejects_end_marker() {
        assert!(matches!(field_len(&[b']'], 0).unwrap_err(), RecordError::Corrupted(_)));
        assert!(matches!(field_len(&[0x00], 0).unwrap_err(), RecordError::Corrupted(_)));
    }

    #[test]
    fn test_field_len_container_spans_frame() {
        let mut buf = MemBuf::new();
        write_empty_frame(&mut buf, Marker::ArrayBegin, 5).unwrap();
        assert_eq!(field_len(buf.as_slice(), 0).unwrap(), buf.len());
    }

    #[test]
    fn test_pair_len() {
        // "a": u8 7
        let bytes = [0x01, b'a', b'c', 0x07];
        assert_eq!(pair_len(&bytes, 0).unwrap(), 4);
    }

    #[test]
    fn test_used_bytes_and_element_offset() {
        // Hand-build ['c' 1]['s' "hi"] inside a cap-8 array with 2 free bytes.
        let mut buf = MemBuf::new();
        buf.write_byte(b'[').unwrap();
        varint::write_varint(&mut buf, 2).unwrap();
        varint::write_varint(&mut buf, 8).unwrap();
        buf.write(&[b'c', 0x01]).unwrap();
        buf.write(&[b's', 0x02, b'h', b'i']).unwrap();
        buf.write_zeros(2).unwrap();
        buf.write_byte(b']').unwrap();

        let frame = Frame::parse_at(buf.as_slice(), 0).unwrap();
        assert_eq!(frame.count, 2);
        assert_eq!(used_bytes(buf.as_slice(), &frame).unwrap(), 6);
        assert_eq!(element_offset(buf.as_slice(), &frame, 0).unwrap(), frame.region_start);
        assert_eq!(element_offset(buf.as_slice(), &frame, 1).unwrap(), frame.region_start + 2);
        assert_eq!(element_offset(buf.as_slice(), &frame, 2).unwrap(), frame.region_start + 6);
        assert!(element_offset(buf.as_slice(), &frame, 3).is_err());

        assert_eq!(validate_container(buf.as_slice(), 0).unwrap(), buf.len());
    }

    #[test]
    fn test_validate_rejects_dirty_free_space() {
        let mut buf = MemBuf::new();
        write_empty_frame(&mut buf, Marker::ArrayBegin, 3).unwrap();
        let frame = Frame::parse_at(buf.as_slice(), 0).unwrap();
        buf.patch(frame.region_start + 1, &[0x55]).unwrap();
        assert!(matches!(
            validate_container(buf.as_slice(), 0).unwrap_err(),
            RecordError::Corrupted(_)
        ));
    }

    #[test]
    fn test_validate_rejects_overrun_count() {
        // Claims 1 element but region is empty: walking reads the end marker
        // as a field marker.
        let mut buf = MemBuf::new();
        buf.write_byte(b'[').unwrap();
        varint::write_varint(&mut buf, 1).unwrap();
        varint::write_varint(&mut buf, 0).unwrap();
        buf.write_byte(b']').unwrap();
        let err = validate_container(buf.as_slice(), 0).unwrap_err();
        assert!(matches!(err, RecordError::Corrupted(_) | RecordError::OutOfBounds(_)));
    }

    #[test]
    fn test_shifted_frame() {
        let mut buf = MemBuf::new();
        let frame = write_empty_frame(&mut buf, Marker::ArrayBegin, 2).unwrap();
        let shifted = frame.shifted(5);
        assert_eq!(shifted.begin, frame.begin + 5);
        assert_eq!(shifted.count_off, frame.count_off + 5);
        assert_eq!(shifted.cap_off, frame.cap_off + 5);
        assert_eq!(shifted.region_start, frame.region_start + 5);
    }
}
