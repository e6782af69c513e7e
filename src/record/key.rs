//! Record prologue: key block and commit hash.
//!
//! Every record starts with a one-byte key-kind marker, an optional key
//! payload, and an 8-byte little-endian commit hash over everything that
//! follows the prologue.
//!
//! ```text
//! Offset  Size      Field
//! 0       1         key kind: 'n' | 'a' | 'u' | 'i' | 's'
//! 1       0|8|var   key payload (none / u64 / i64 / varint len + UTF-8)
//! ...     8         commit hash: u64 LE
//! ```

use crate::error::{RecordError, Result};
use crate::membuf::MemBuf;
use crate::varint;

/// Size of the commit hash slot in bytes.
pub const COMMIT_HASH_SIZE: usize = 8;

// ── Key kinds ──────────────────────────────────────────────────────

/// Kind marker of a record key (stored as one ASCII byte at offset 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyKind {
    /// No key; the record is anonymous.
    None = b'n',
    /// Auto-assigned unsigned key (assignment belongs to the embedding
    /// storage layer; a fresh record stores 0).
    Auto = b'a',
    /// Caller-provided unsigned key.
    Unsigned = b'u',
    /// Caller-provided signed key.
    Signed = b'i',
    /// Caller-provided string key.
    String = b's',
}

impl KeyKind {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            b'n' => Some(Self::None),
            b'a' => Some(Self::Auto),
            b'u' => Some(Self::Unsigned),
            b'i' => Some(Self::Signed),
            b's' => Some(Self::String),
            _ => None,
        }
    }
}

/// A record key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    None,
    Auto(u64),
    Unsigned(u64),
    Signed(i64),
    String(String),
}

impl RecordKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            RecordKey::None => KeyKind::None,
            RecordKey::Auto(_) => KeyKind::Auto,
            RecordKey::Unsigned(_) => KeyKind::Unsigned,
            RecordKey::Signed(_) => KeyKind::Signed,
            RecordKey::String(_) => KeyKind::String,
        }
    }
}

// ── Key block I/O ──────────────────────────────────────────────────

/// Write the key block at the buffer cursor.
pub fn write_key(buf: &mut MemBuf, key: &RecordKey) -> Result<()> {
    buf.write_byte(key.kind() as u8)?;
    match key {
        RecordKey::None => {}
        RecordKey::Auto(v) | RecordKey::Unsigned(v) => buf.write_typed::<u64>(*v)?,
        RecordKey::Signed(v) => buf.write_typed::<i64>(*v)?,
        RecordKey::String(s) => {
            varint::write_varint(buf, s.len() as u64)?;
            buf.write(s.as_bytes())?;
        }
    }
    Ok(())
}

/// Read the key block at the buffer cursor, advancing past it.
pub fn read_key(buf: &mut MemBuf) -> Result<RecordKey> {
    let kind_byte = buf.read_byte()?;
    let kind = KeyKind::from_u8(kind_byte)
        .ok_or_else(|| RecordError::Corrupted(format!("unknown key kind 0x{:02x}", kind_byte)))?;
    Ok(match kind {
        KeyKind::None => RecordKey::None,
        KeyKind::Auto => RecordKey::Auto(buf.read_typed::<u64>()?),
        KeyKind::Unsigned => RecordKey::Unsigned(buf.read_typed::<u64>()?),
        KeyKind::Signed => RecordKey::Signed(buf.read_typed::<i64>()?),
        KeyKind::String => {
            let len = varint::read_varint(buf)? as usize;
            let off = buf.tell();
            let bytes = buf.slice_at(off, len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| RecordError::Corrupted("key is not valid UTF-8".into()))?
                .to_string();
            buf.skip(len)?;
            RecordKey::String(s)
        }
    })
}

/// Read the key block at the start of `bytes` without a buffer cursor.
pub fn read_key_at(bytes: &[u8]) -> Result<RecordKey> {
    let kind_byte = *bytes.first().ok_or(RecordError::OutOfBounds(0))?;
    let kind = KeyKind::from_u8(kind_byte)
        .ok_or_else(|| RecordError::Corrupted(format!("unknown key kind 0x{:02x}", kind_byte)))?;
    let fixed = |at: usize| -> Result<[u8; 8]> {
        bytes
            .get(at..at + 8)
            .ok_or(RecordError::OutOfBounds(at + 8))
            .map(|s| s.try_into().unwrap())
    };
    Ok(match kind {
        KeyKind::None => RecordKey::None,
        KeyKind::Auto => RecordKey::Auto(u64::from_le_bytes(fixed(1)?)),
        KeyKind::Unsigned => RecordKey::Unsigned(u64::from_le_bytes(fixed(1)?)),
        KeyKind::Signed => RecordKey::Signed(i64::from_le_bytes(fixed(1)?)),
        KeyKind::String => {
            let (len, vlen) = varint::decode_at(bytes, 1)?;
            let start = 1 + vlen;
            let end = start + len as usize;
            let raw = bytes.get(start..end).ok_or(RecordError::OutOfBounds(end))?;
            let s = std::str::from_utf8(raw)
                .map_err(|_| RecordError::Corrupted("key is not valid UTF-8".into()))?;
            RecordKey::String(s.to_string())
        }
    })
}

/// Advance the cursor past the key block without materializing it.
pub fn skip_key(buf: &mut MemBuf) -> Result<()> {
    let kind_byte = buf.read_byte()?;
    let kind = KeyKind::from_u8(kind_byte)
        .ok_or_else(|| RecordError::Corrupted(format!("unknown key kind 0x{:02x}", kind_byte)))?;
    match kind {
        KeyKind::None => {}
        KeyKind::Auto | KeyKind::Unsigned | KeyKind::Signed => buf.skip(8)?,
        KeyKind::String => {
            let len = varint::read_varint(buf)?;
            buf.skip(len as usize)?;
        }
    }
    Ok(())
}

/// Byte length of the key block starting at offset 0 of `bytes`.
pub fn key_block_len(bytes: &[u8]) -> Result<usize> {
    let kind_byte = *bytes.first().ok_or(RecordError::OutOfBounds(0))?;
    let kind = KeyKind::from_u8(kind_byte)
        .ok_or_else(|| RecordError::Corrupted(format!("unknown key kind 0x{:02x}", kind_byte)))?;
    Ok(match kind {
        KeyKind::None => 1,
        KeyKind::Auto | KeyKind::Unsigned | KeyKind::Signed => 1 + 8,
        KeyKind::String => {
            let (len, vlen) = varint::decode_at(bytes, 1)?;
            1 + vlen + len as usize
        }
    })
}

/// Rewrite a string key in place. This is the only supported key mutation;
/// other key kinds are fixed-width and immutable. Returns the signed byte
/// shift of the buffer tail.
pub fn update_string_key(buf: &mut MemBuf, new_key: &str) -> Result<i64> {
    let kind_byte = buf
        .as_slice()
        .first()
        .copied()
        .ok_or(RecordError::OutOfBounds(0))?;
    if KeyKind::from_u8(kind_byte) != Some(KeyKind::String) {
        return Err(RecordError::TypeMismatch { expected: "string key", found: "other key kind" });
    }
    let (old_len, vlen) = varint::decode_at(buf.as_slice(), 1)?;
    let old_len = old_len as usize;
    let new_len = new_key.len();

    // Length prefix first; its shift moves the key bytes region.
    let prefix_shift = varint::update_varint(buf, 1, new_len as u64)?;
    let bytes_at = (1 + vlen).wrapping_add_signed(prefix_shift as isize);
    if new_len > old_len {
        buf.insert_gap(bytes_at + old_len, new_len - old_len)?;
    } else if new_len < old_len {
        buf.remove_gap(bytes_at + new_len, old_len - new_len)?;
    }
    buf.patch(bytes_at, new_key.as_bytes())?;
    Ok(prefix_shift + new_len as i64 - old_len as i64)
}

// ── Commit hash ────────────────────────────────────────────────────

/// Compute the commit hash of a record payload (everything after the
/// key block and hash slot). Fixed choice for this format: the first 8
/// little-endian bytes of the blake3 digest. Deterministic and well-mixed;
/// not relied on for cryptographic strength.
pub fn commit_hash_compute(payload: &[u8]) -> u64 {
    let digest = blake3::hash(payload);
    u64::from_le_bytes(digest.as_bytes()[0..8].try_into().unwrap())
}

/// Offset of the commit hash slot in a record buffer.
pub fn commit_hash_offset(bytes: &[u8]) -> Result<usize> {
    key_block_len(bytes)
}

/// Offset of the first payload byte (right after the prologue).
pub fn payload_offset(bytes: &[u8]) -> Result<usize> {
    Ok(key_block_len(bytes)? + COMMIT_HASH_SIZE)
}

/// Read the stored commit hash.
pub fn commit_hash_read(bytes: &[u8]) -> Result<u64> {
    let at = commit_hash_offset(bytes)?;
    let end = at + COMMIT_HASH_SIZE;
    if end > bytes.len() {
        return Err(RecordError::OutOfBounds(end));
    }
    Ok(u64::from_le_bytes(bytes[at..end].try_into().unwrap()))
}

/// Recompute the commit hash over the current payload and store it.
/// Returns the new hash.
pub fn commit_hash_update(buf: &mut MemBuf) -> Result<u64> {
    let payload_at = payload_offset(buf.as_slice())?;
    if payload_at > buf.len() {
        return Err(RecordError::OutOfBounds(payload_at));
    }
    let hash = commit_hash_compute(&buf.as_slice()[payload_at..]);
    let hash_at = payload_at - COMMIT_HASH_SIZE;
    buf.patch(hash_at, &hash.to_le_bytes())?;
    Ok(hash)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(key: RecordKey) {
        let mut buf = MemBuf::new();
        write_key(&mut buf, &key).unwrap();
        let written = buf.tell();
        assert_eq!(key_block_len(buf.as_slice()).unwrap(), written);

        buf.seek(0).unwrap();
        assert_eq!(read_key(&mut buf).unwrap(), key);
        assert_eq!(buf.tell(), written);

        buf.seek(0).unwrap();
        skip_key(&mut buf).unwrap();
        assert_eq!(buf.tell(), written);
    }

    #[test]
    fn test_key_roundtrip_all_kinds() {
        roundtrip(RecordKey::None);
        roundtrip(RecordKey::Auto(0));
        roundtrip(RecordKey::Unsigned(42));
        roundtrip(RecordKey::Signed(-7));
        roundtrip(RecordKey::String("user:1001".into()));
        roundtrip(RecordKey::String(String::new()));
    }

    #[test]
    fn test_unsigned_key_layout() {
        let mut buf = MemBuf::new();
        write_key(&mut buf, &RecordKey::Unsigned(42)).unwrap();
        assert_eq!(buf.as_slice(), &[b'u', 0x2a, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_key_kind_is_corrupted() {
        let mut buf = MemBuf::from_vec(vec![b'z', 0, 0]);
        assert!(matches!(read_key(&mut buf).unwrap_err(), RecordError::Corrupted(_)));
        assert!(matches!(key_block_len(&[b'z']).unwrap_err(), RecordError::Corrupted(_)));
    }

    #[test]
    fn test_update_string_key_same_len() {
        let mut buf = MemBuf::new();
        write_key(&mut buf, &RecordKey::String("abc".into())).unwrap();
        buf.write(&[0xee; 8]).unwrap();

        let shift = update_string_key(&mut buf, "xyz").unwrap();
        assert_eq!(shift, 0);
        buf.seek(0).unwrap();
        assert_eq!(read_key(&mut buf).unwrap(), RecordKey::String("xyz".into()));
        assert_eq!(&buf.as_slice()[buf.tell()..], &[0xee; 8]);
    }

    #[test]
    fn test_update_string_key_grows_and_shrinks() {
        let mut buf = MemBuf::new();
        write_key(&mut buf, &RecordKey::String("ab".into())).unwrap();
        buf.write(&[0xee; 4]).unwrap();
        let len_before = buf.len();

        let shift = update_string_key(&mut buf, "abcdef").unwrap();
        assert_eq!(shift, 4);
        assert_eq!(buf.len(), len_before + 4);
        buf.seek(0).unwrap();
        assert_eq!(read_key(&mut buf).unwrap(), RecordKey::String("abcdef".into()));
        assert_eq!(&buf.as_slice()[buf.tell()..], &[0xee; 4]);

        let shift = update_string_key(&mut buf, "a").unwrap();
        assert_eq!(shift, -5);
        buf.seek(0).unwrap();
        assert_eq!(read_key(&mut buf).unwrap(), RecordKey::String("a".into()));
        assert_eq!(&buf.as_slice()[buf.tell()..], &[0xee; 4]);
    }

    #[test]
    fn test_update_string_key_wrong_kind() {
        let mut buf = MemBuf::new();
        write_key(&mut buf, &RecordKey::Unsigned(1)).unwrap();
        assert!(matches!(
            update_string_key(&mut buf, "x").unwrap_err(),
            RecordError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_commit_hash_deterministic() {
        let payload = b"some record payload";
        let h1 = commit_hash_compute(payload);
        let h2 = commit_hash_compute(payload);
        assert_eq!(h1, h2);
        assert_ne!(h1, commit_hash_compute(b"other payload"));
    }

    #[test]
    fn test_commit_hash_update_writes_slot() {
        let mut buf = MemBuf::new();
        write_key(&mut buf, &RecordKey::Unsigned(9)).unwrap();
        buf.write(&[0u8; COMMIT_HASH_SIZE]).unwrap();
        buf.write(b"payload").unwrap();

        let hash = commit_hash_update(&mut buf).unwrap();
        assert_eq!(hash, commit_hash_compute(b"payload"));
        assert_eq!(commit_hash_read(buf.as_slice()).unwrap(), hash);
    }
}
