//! Scalar field codecs: strings, binary values, numeric width selection.
//!
//! Strings are varint-length-prefixed UTF-8 with no terminator. Binary
//! values come in two shapes: registered-MIME (`b`: varint mime-id, varint
//! len, bytes) and user-tagged (`x`: varint tag-len, tag bytes, varint len,
//! bytes). All fixed-width numerics are little-endian at their native
//! width; the insertion engine widens an integer to the smallest fitting
//! marker.

use crate::error::{RecordError, Result};
use crate::membuf::MemBuf;
use crate::record::marker::Marker;
use crate::varint;

// ── MIME tag registry ──────────────────────────────────────────────

/// Registered MIME types addressable by varint id. Id 0 is the opaque
/// fallback; unknown type names encode as id 0 on write.
pub const MIME_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/json",
    "application/pdf",
    "application/xml",
    "application/zip",
    "application/gzip",
    "application/x-tar",
    "application/msgpack",
    "application/protobuf",
    "application/sql",
    "application/wasm",
    "audio/mpeg",
    "audio/ogg",
    "audio/wav",
    "font/woff2",
    "image/bmp",
    "image/gif",
    "image/jpeg",
    "image/png",
    "image/svg+xml",
    "image/tiff",
    "image/webp",
    "text/css",
    "text/csv",
    "text/html",
    "text/javascript",
    "text/markdown",
    "text/plain",
    "video/mp4",
    "video/webm",
];

/// Look up the id of a MIME type name. Unknown names map to id 0.
pub fn mime_id(name: &str) -> u64 {
    MIME_TYPES.iter().position(|&m| m == name).unwrap_or(0) as u64
}

/// Look up the MIME type name for an id.
pub fn mime_name(id: u64) -> Option<&'static str> {
    MIME_TYPES.get(id as usize).copied()
}

// ── Strings ────────────────────────────────────────────────────────

/// Write a string payload (varint len + bytes) at the buffer cursor.
pub fn write_string_payload(buf: &mut MemBuf, s: &str) -> Result<()> {
    varint::write_varint(buf, s.len() as u64)?;
    buf.write(s.as_bytes())
}

/// Decode a string payload at `at`. Returns the string and the total
/// payload length.
pub fn read_string_payload(bytes: &[u8], at: usize) -> Result<(&str, usize)> {
    let (len, vlen) = varint::decode_at(bytes, at)?;
    let start = at + vlen;
    let end = start + len as usize;
    if end > bytes.len() {
        return Err(RecordError::OutOfBounds(end));
    }
    let s = std::str::from_utf8(&bytes[start..end])
        .map_err(|_| RecordError::Corrupted("string payload is not valid UTF-8".into()))?;
    Ok((s, vlen + len as usize))
}

/// Total byte length of a string payload at `at` without validating UTF-8.
pub fn string_payload_len(bytes: &[u8], at: usize) -> Result<usize> {
    let (len, vlen) = varint::decode_at(bytes, at)?;
    let total = vlen + len as usize;
    if at + total > bytes.len() {
        return Err(RecordError::OutOfBounds(at + total));
    }
    Ok(total)
}

// ── Binary ─────────────────────────────────────────────────────────

/// A decoded binary field: the tag (registered MIME name or user tag) and
/// the payload bytes, borrowed from the record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryRef<'r> {
    /// Registered MIME name for `b` fields.
    pub mime: Option<&'static str>,
    /// User tag for `x` fields.
    pub user_tag: Option<&'r str>,
    /// Raw payload bytes.
    pub bytes: &'r [u8],
}

/// Write a registered-MIME binary payload at the buffer cursor.
pub fn write_binary_payload(buf: &mut MemBuf, bytes: &[u8], mime: &str) -> Result<()> {
    varint::write_varint(buf, mime_id(mime))?;
    varint::write_varint(buf, bytes.len() as u64)?;
    buf.write(bytes)
}

/// Write a user-tagged binary payload at the buffer cursor.
pub fn write_user_binary_payload(buf: &mut MemBuf, bytes: &[u8], tag: &str) -> Result<()> {
    varint::write_varint(buf, tag.len() as u64)?;
    buf.write(tag.as_bytes())?;
    varint::write_varint(buf, bytes.len() as u64)?;
    buf.write(bytes)
}

/// Decode a binary payload at `at` for the given marker (`Binary` or
/// `UserBinary`). Returns the view and the total payload length.
pub fn read_binary_payload(bytes: &[u8], at: usize, marker: Marker) -> Result<(BinaryRef<'_>, usize)> {
    match marker {
        Marker::Binary => {
            let (id, id_len) = varint::decode_at(bytes, at)?;
            let mime = mime_name(id)
                .ok_or_else(|| RecordError::Corrupted(format!("unknown mime id {}", id)))?;
            let (len, len_len) = varint::decode_at(bytes, at + id_len)?;
            let start = at + id_len + len_len;
            let end = start + len as usize;
            if end > bytes.len() {
                return Err(RecordError::OutOfBounds(end));
            }
            let view = BinaryRef { mime: Some(mime), user_tag: None, bytes: &bytes[start..end] };
            Ok((view, id_len + len_len + len as usize))
        }
        Marker::UserBinary => {
            let (tag_len, tl_len) = varint::decode_at(bytes, at)?;
            let tag_start = at + tl_len;
            let tag_end = tag_start + tag_len as usize;
            if tag_end > bytes.len() {
                return Err(RecordError::OutOfBounds(tag_end));
            }
            let tag = std::str::from_utf8(&bytes[tag_start..tag_end])
                .map_err(|_| RecordError::Corrupted("binary user tag is not valid UTF-8".into()))?;
            let (len, len_len) = varint::decode_at(bytes, tag_end)?;
            let start = tag_end + len_len;
            let end = start + len as usize;
            if end > bytes.len() {
                return Err(RecordError::OutOfBounds(end));
            }
            let view = BinaryRef { mime: None, user_tag: Some(tag), bytes: &bytes[start..end] };
            Ok((view, tl_len + tag_len as usize + len_len + len as usize))
        }
        other => Err(RecordError::TypeMismatch { expected: "binary", found: other.type_name() }),
    }
}

/// Total byte length of a binary payload at `at`.
pub fn binary_payload_len(bytes: &[u8], at: usize, marker: Marker) -> Result<usize> {
    match marker {
        Marker::Binary => {
            let (_, id_len) = varint::decode_at(bytes, at)?;
            let (len, len_len) = varint::decode_at(bytes, at + id_len)?;
            let total = id_len + len_len + len as usize;
            if at + total > bytes.len() {
                return Err(RecordError::OutOfBounds(at + total));
            }
            Ok(total)
        }
        Marker::UserBinary => {
            let (tag_len, tl_len) = varint::decode_at(bytes, at)?;
            let after_tag = at + tl_len + tag_len as usize;
            let (len, len_len) = varint::decode_at(bytes, after_tag)?;
            let total = tl_len + tag_len as usize + len_len + len as usize;
            if at + total > bytes.len() {
                return Err(RecordError::OutOfBounds(at + total));
            }
            Ok(total)
        }
        other => Err(RecordError::TypeMismatch { expected: "binary", found: other.type_name() }),
    }
}

// ── Numeric width selection ────────────────────────────────────────

/// The smallest unsigned marker whose width fits `value`.
pub fn unsigned_marker(value: u64) -> Marker {
    if value <= u8::MAX as u64 {
        Marker::U8
    } else if value <= u16::MAX as u64 {
        Marker::U16
    } else if value <= u32::MAX as u64 {
        Marker::U32
    } else {
        Marker::U64
    }
}

/// The smallest signed marker whose width fits `value`.
pub fn signed_marker(value: i64) -> Marker {
    if value >= i8::MIN as i64 && value <= i8::MAX as i64 {
        Marker::I8
    } else if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
        Marker::I16
    } else if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
        Marker::I32
    } else {
        Marker::I64
    }
}

/// Encode an unsigned value at its marker's width (LE) into `out`,
/// returning the width.
pub fn encode_unsigned(value: u64, marker: Marker, out: &mut [u8]) -> Result<usize> {
    let width = marker
        .fixed_value_size()
        .ok_or(RecordError::TypeMismatch { expected: "fixed-width", found: marker.type_name() })?;
    out[..width].copy_from_slice(&value.to_le_bytes()[..width]);
    Ok(width)
}

/// Encode a signed value at its marker's width (LE) into `out`,
/// returning the width.
pub fn encode_signed(value: i64, marker: Marker, out: &mut [u8]) -> Result<usize> {
    let width = marker
        .fixed_value_size()
        .ok_or(RecordError::TypeMismatch { expected: "fixed-width", found: marker.type_name() })?;
    out[..width].copy_from_slice(&value.to_le_bytes()[..width]);
    Ok(width)
}

/// Decode the unsigned value of a `U8`..`U64` field payload at `at`.
pub fn decode_unsigned(bytes: &[u8], at: usize, marker: Marker) -> Result<u64> {
    let width = fixed_width(bytes, at, marker)?;
    let mut le = [0u8; 8];
    le[..width].copy_from_slice(&bytes[at..at + width]);
    Ok(u64::from_le_bytes(le))
}

/// Decode the signed value of an `I8`..`I64` field payload at `at`
/// (sign-extended).
pub fn decode_signed(bytes: &[u8], at: usize, marker: Marker) -> Result<i64> {
    let width = fixed_width(bytes, at, marker)?;
    let negative = bytes[at + width - 1] & 0x80 != 0;
    let mut le = [if negative { 0xff } else { 0 }; 8];
    le[..width].copy_from_slice(&bytes[at..at + width]);
    Ok(i64::from_le_bytes(le))
}

fn fixed_width(bytes: &[u8], at: usize, marker: Marker) -> Result<usize> {
    let width = marker
        .fixed_value_size()
        .ok_or(RecordError::TypeMismatch { expected: "fixed-width", found: marker.type_name() })?;
    if at + width > bytes.len() {
        return Err(RecordError::OutOfBounds(at + width));
    }
    Ok(width)
}

// ── Tests ──────────────────────────────────────────────────────────
