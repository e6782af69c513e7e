//! Record layer: the columnar binary document format and its engines.
//!
//! A record is a single contiguous buffer: key block, commit hash, root
//! array. Readers open cursors over the buffer; revisions copy it, edit in
//! place, and publish a new commit hash; path indexes mirror the tree in a
//! buffer of their own.

pub mod containers;
pub mod cursor;
pub mod edit;
pub mod index;
pub mod insert;
pub mod key;
pub mod marker;
pub mod path;
pub mod revision;
pub mod scalars;

use serde_json::Value;

use crate::error::{RecordError, Result};
use crate::membuf::MemBuf;
use crate::record::containers::validate_container;
use crate::record::cursor::{ArrayCursor, ColumnEntry, FieldAccess, ObjectCursor};
use crate::record::insert::Inserter;
use crate::record::key::RecordKey;
use crate::record::marker::Marker;
use crate::record::path::{DotPath, PathValue};

// ── Record ─────────────────────────────────────────────────────────

/// A single well-formed record buffer: key + commit hash + root array.
/// The record owns its buffer; cursors borrow it read-only.
#[derive(Debug, Clone)]
pub struct Record {
    buf: MemBuf,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.buf.as_slice() == other.buf.as_slice()
    }
}

impl Record {
    pub(crate) fn from_membuf(buf: MemBuf) -> Self {
        Self { buf }
    }

    /// Start building a record with the given key; `cap_hint` reserves
    /// bytes in the root array region.
    pub fn builder(record_key: RecordKey, cap_hint: u64) -> Result<Inserter> {
        Inserter::for_record(&record_key, cap_hint)
    }

    /// Create an empty record (root array with no elements).
    pub fn new(record_key: RecordKey) -> Result<Self> {
        Self::builder(record_key, 0)?.finish()
    }

    /// Build a record from a JSON tree. A top-level JSON array becomes the
    /// root array's elements; any other value becomes the root array's
    /// single element. JSON arrays encode as general arrays, never as
    /// columns; columns are built through the explicit inserter API.
    pub fn from_json(record_key: RecordKey, value: &Value) -> Result<Self> {
        let mut ins = Self::builder(record_key, 0)?;
        match value {
            Value::Array(items) => {
                for item in items {
                    insert_json_element(&mut ins, item)?;
                }
            }
            other => insert_json_element(&mut ins, other)?,
        }
        ins.finish()
    }

    /// Open a record over existing bytes, validating well-formedness:
    /// key block, hash slot, root array framing, every marker in the
    /// closed set, and the walk ending exactly at end-of-buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let payload_at = key::payload_offset(&bytes)?;
        if payload_at > bytes.len() {
            return Err(RecordError::OutOfBounds(payload_at));
        }
        let root_marker = Marker::try_from_u8(
            *bytes.get(payload_at).ok_or(RecordError::OutOfBounds(payload_at))?,
        )?;
        if !root_marker.is_array_begin() {
            return Err(RecordError::Corrupted("root container is not an array".into()));
        }
        let root_len = validate_container(&bytes, payload_at)?;
        if payload_at + root_len != bytes.len() {
            return Err(RecordError::Corrupted(format!(
                "trailing bytes after root array ({} of {})",
                payload_at + root_len,
                bytes.len()
            )));
        }
        Ok(Self { buf: MemBuf::from_vec(bytes) })
    }

    // ── Raw access ─────────────────────────────────────────────────

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_vec()
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn membuf_mut(&mut self) -> &mut MemBuf {
        &mut self.buf
    }

    // ── Prologue ───────────────────────────────────────────────────

    /// The record's key.
    pub fn key(&self) -> Result<RecordKey> {
        key::read_key_at(self.buf.as_slice())
    }

    /// The stored commit hash.
    pub fn commit_hash(&self) -> Result<u64> {
        key::commit_hash_read(self.buf.as_slice())
    }

    /// Recompute the payload hash and compare against the stored one.
    pub fn verify_hash(&self) -> Result<bool> {
        let payload_at = self.payload_offset()?;
        let computed = key::commit_hash_compute(&self.buf.as_slice()[payload_at..]);
        Ok(computed == self.commit_hash()?)
    }

    /// True if both records carry the same commit hash.
    pub fn same_revision(&self, other: &Record) -> Result<bool> {
        Ok(self.commit_hash()? == other.commit_hash()?)
    }

    /// Offset of the root array (first byte after key block + hash).
    pub fn payload_offset(&self) -> Result<usize> {
        key::payload_offset(self.buf.as_slice())
    }

    // ── Reading ────────────────────────────────────────────────────

    /// Open a read cursor on the root array.
    pub fn read(&self) -> Result<ArrayCursor<'_>> {
        ArrayCursor::open_at(self.buf.as_slice(), self.payload_offset()?)
    }

    /// Evaluate a dot path, yielding the target field or column slot.
    pub fn resolve(&self, dot_path: &DotPath) -> Result<PathValue<'_>> {
        path::resolve_value(self.buf.as_slice(), self.payload_offset()?, dot_path)
    }

    /// Evaluate a dot path and materialize the target as JSON.
    pub fn get(&self, dot_path: &DotPath) -> Result<Value> {
        match self.resolve(dot_path)? {
            PathValue::Field(field) => field_to_json(&field),
            PathValue::ColumnSlot { column, index } => Ok(column_entry_to_json(column.get(index)?)),
        }
    }

    /// Materialize the whole record as a JSON tree. Columns become plain
    /// arrays; binary fields become `{"$binary": {...}}` objects; on
    /// duplicate object keys the last occurrence wins (cursors preserve
    /// all of them).
    pub fn to_json(&self) -> Result<Value> {
        let mut root = self.read()?;
        let mut items = Vec::new();
        while root.next() {
            items.push(field_to_json(&root.field()?)?);
        }
        if let Some(e) = root.error() {
            return Err(e.clone());
        }
        Ok(Value::Array(items))
    }
}

// ── JSON bridging ──────────────────────────────────────────────────

pub(crate) fn insert_json_element(ins: &mut Inserter, value: &Value) -> Result<()> {
    match value {
        Value::Null => ins.push_null(),
        Value::Bool(b) => ins.push_bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                ins.push_unsigned(u)
            } else if let Some(i) = n.as_i64() {
                ins.push_signed(i)
            } else {
                ins.push_float(n.as_f64().unwrap_or(f64::NAN) as f32)
            }
        }
        Value::String(s) => ins.push_string(s),
        Value::Array(items) => {
            ins.begin_array(0)?;
            for item in items {
                insert_json_element(ins, item)?;
            }
            ins.end()
        }
        Value::Object(map) => {
            ins.begin_object(0)?;
            for (k, v) in map {
                insert_json_prop(ins, k, v)?;
            }
            ins.end()
        }
    }
}

fn insert_json_prop(ins: &mut Inserter, prop_key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => ins.prop_null(prop_key),
        Value::Bool(b) => ins.prop_bool(prop_key, *b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                ins.prop_unsigned(prop_key, u)
            } else if let Some(i) = n.as_i64() {
                ins.prop_signed(prop_key, i)
            } else {
                ins.prop_float(prop_key, n.as_f64().unwrap_or(f64::NAN) as f32)
            }
        }
        Value::String(s) => ins.prop_string(prop_key, s),
        Value::Array(items) => {
            ins.prop_begin_array(prop_key, 0)?;
            for item in items {
                insert_json_element(ins, item)?;
            }
            ins.end()
        }
        Value::Object(map) => {
            ins.prop_begin_object(prop_key, 0)?;
            for (k, v) in map {
                insert_json_prop(ins, k, v)?;
            }
            ins.end()
        }
    }
}

fn number_json(n: f32) -> Value {
    serde_json::Number::from_f64(n as f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn hex_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Materialize one field as JSON, descending into containers.
pub(crate) fn field_to_json(field: &FieldAccess<'_>) -> Result<Value> {
    let marker = field.marker();
    Ok(match marker.base_kind() {
        Marker::Null => Value::Null,
        Marker::True => Value::Bool(true),
        Marker::False => Value::Bool(false),
        Marker::U8 | Marker::U16 | Marker::U32 | Marker::U64 => {
            Value::Number(field.as_unsigned()?.into())
        }
        Marker::I8 | Marker::I16 | Marker::I32 | Marker::I64 => {
            Value::Number(field.as_signed()?.into())
        }
        Marker::Float => number_json(field.as_float()?),
        Marker::String => Value::String(field.as_string()?.to_string()),
        Marker::Binary | Marker::UserBinary => {
            let bin = field.as_binary()?;
            let tag = bin.mime.map(str::to_string).or_else(|| bin.user_tag.map(str::to_string));
            serde_json::json!({
                "$binary": { "tag": tag, "hex": hex_string(bin.bytes) }
            })
        }
        Marker::ArrayBegin => {
            let mut cur = field.as_array()?;
            let mut items = Vec::new();
            while cur.next() {
                items.push(field_to_json(&cur.field()?)?);
            }
            if let Some(e) = cur.error() {
                return Err(e.clone());
            }
            Value::Array(items)
        }
        Marker::ObjectBegin => {
            let mut cur: ObjectCursor<'_> = field.as_object()?;
            let mut map = serde_json::Map::new();
            while cur.next() {
                map.insert(cur.key_name()?.to_string(), field_to_json(&cur.field()?)?);
            }
            if let Some(e) = cur.error() {
                return Err(e.clone());
            }
            Value::Object(map)
        }
        m if m.is_column_begin() => {
            let col = field.as_column()?;
            let mut items = Vec::new();
            for entry in col.iter() {
                items.push(column_entry_to_json(entry?));
            }
            Value::Array(items)
        }
        other => {
            return Err(RecordError::Corrupted(format!(
                "marker '{}' cannot start a field",
                other.as_u8() as char
            )))
        }
    })
}

fn column_entry_to_json(entry: ColumnEntry) -> Value {
    match entry {
        ColumnEntry::Null => Value::Null,
        ColumnEntry::Bool(b) => Value::Bool(b),
        ColumnEntry::Unsigned(u) => Value::Number(u.into()),
        ColumnEntry::Signed(i) => Value::Number(i.into()),
        ColumnEntry::Float(f) => number_json(f),
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_record() {
        let record = Record::new(RecordKey::None).unwrap();
        assert_eq!(record.to_json().unwrap(), json!([]));
        // 'n' + hash8 + '[' 00 00 ']'
        assert_eq!(record.len(), 1 + key::COMMIT_HASH_SIZE + 4);
        assert!(record.verify_hash().unwrap());
    }

    #[test]
    fn test_from_json_roundtrip_structure() {
        let value = json!([1, "hi", null, true, {"a": [1.5, -3]}, [255, 256, 65536]]);
        let record = Record::from_json(RecordKey::Unsigned(42), &value).unwrap();
        assert_eq!(record.to_json().unwrap(), value);
        assert_eq!(record.key().unwrap(), RecordKey::Unsigned(42));
    }

    #[test]
    fn test_from_json_wraps_non_array_root() {
        let record = Record::from_json(RecordKey::None, &json!({"k": 1})).unwrap();
        assert_eq!(record.to_json().unwrap(), json!([{"k": 1}]));
    }

    #[test]
    fn test_from_json_preserves_property_order() {
        let value = json!([{"zebra": 1, "alpha": 2, "mid": 3}]);
        let record = Record::from_json(RecordKey::None, &value).unwrap();
        assert_eq!(record.to_json().unwrap(), value);

        let mut root = record.read().unwrap();
        assert!(root.next());
        let mut obj = root.field().unwrap().as_object().unwrap();
        let mut keys = Vec::new();
        while obj.next() {
            keys.push(obj.key_name().unwrap().to_string());
        }
        assert_eq!(keys, vec!["zebra", "alpha", "mid"]);
    }

    #[test]
    fn test_integer_widths_narrow_on_encode() {
        let record = Record::from_json(RecordKey::None, &json!([1, 300, -2])).unwrap();
        let mut root = record.read().unwrap();
        assert!(root.next());
        assert_eq!(root.field_type().unwrap(), Marker::U8);
        assert!(root.next());
        assert_eq!(root.field_type().unwrap(), Marker::U16);
        assert!(root.next());
        assert_eq!(root.field_type().unwrap(), Marker::I8);
    }

    #[test]
    fn test_from_bytes_validates() {
        let record = Record::from_json(RecordKey::Signed(-1), &json!([1, [2, 3]])).unwrap();
        let bytes = record.as_bytes().to_vec();
        let reopened = Record::from_bytes(bytes).unwrap();
        assert_eq!(reopened, record);
    }

    #[test]
    fn test_from_bytes_rejects_trailing_garbage() {
        let record = Record::new(RecordKey::None).unwrap();
        let mut bytes = record.into_bytes();
        bytes.push(0xaa);
        assert!(matches!(
            Record::from_bytes(bytes).unwrap_err(),
            RecordError::Corrupted(_)
        ));
    }

    #[test]
    fn test_from_bytes_rejects_bad_marker() {
        let record = Record::from_json(RecordKey::None, &json!([true])).unwrap();
        let root = containers::Frame::parse_at(record.as_bytes(), record.payload_offset().unwrap())
            .unwrap();
        let mut bytes = record.into_bytes();
        assert_eq!(bytes[root.region_start], b't');
        bytes[root.region_start] = 0x07;
        let err = Record::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, RecordError::Corrupted(_)));
    }

    #[test]
    fn test_commit_hash_determinism() {
        let a = Record::from_json(RecordKey::Unsigned(1), &json!([1, 2, 3])).unwrap();
        let b = Record::from_json(RecordKey::Unsigned(1), &json!([1, 2, 3])).unwrap();
        assert_eq!(a.commit_hash().unwrap(), b.commit_hash().unwrap());
        assert!(a.same_revision(&b).unwrap());

        let c = Record::from_json(RecordKey::Unsigned(1), &json!([1, 2, 4])).unwrap();
        assert!(!a.same_revision(&c).unwrap());
    }

    #[test]
    fn test_get_by_path() {
        let record =
            Record::from_json(RecordKey::None, &json!([{"a": {"b": [10, 20]}}, "tail"])).unwrap();
        assert_eq!(record.get(&DotPath::parse("0.a.b.1").unwrap()).unwrap(), json!(20));
        assert_eq!(record.get(&DotPath::parse("1").unwrap()).unwrap(), json!("tail"));
        assert_eq!(record.get(&DotPath::parse("0.a").unwrap()).unwrap(), json!({"b": [10, 20]}));
    }

    #[test]
    fn test_binary_to_json_shape() {
        let mut ins = Record::builder(RecordKey::None, 0).unwrap();
        ins.push_binary(&[0xde, 0xad], "application/octet-stream").unwrap();
        let record = ins.finish().unwrap();
        assert_eq!(
            record.to_json().unwrap(),
            json!([{ "$binary": { "tag": "application/octet-stream", "hex": "dead" } }])
        );
    }
}
