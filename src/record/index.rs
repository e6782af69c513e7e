//! Path index: a secondary buffer mirroring a record's tree as
//! offset-addressed nodes.
//!
//! The index repeats the record's key block and commit hash, then stores
//! one node per value. Container nodes carry a child-offset table, so a
//! dot path resolves in O(depth) container hops with no linear record
//! scans. An index binds to a record only while key and commit hash both
//! match; any committed revision detaches it.
//!
//! ```text
//! <key block copied from record> <commit hash 8> <root node>
//!
//! node:
//!   kind        1 byte: 'P' prop | 'a' array element | 'A' column element
//!   field type  1 byte (exact marker from the record)
//!   value-off   varint, absent for null/true/false
//!   key-off     varint, 'P' nodes only
//!   children    varint count + count fixed-width offset slots + nodes,
//!               container field types on 'P'/'a' nodes only
//! ```
//!
//! Child-offset slots are width-pinned varints (redundant continuation
//! bytes), so back-patching a slot after its child is flattened never
//! shifts the tail.

use crate::error::{RecordError, Result};
use crate::membuf::MemBuf;
use crate::record::containers::{self, Frame};
use crate::record::cursor::{ColumnCursor, FieldAccess};
use crate::record::key;
use crate::record::marker::Marker;
use crate::record::path::{DotPath, PathSegment};
use crate::record::scalars;
use crate::record::Record;
use crate::varint;

/// Node kind markers.
const NODE_PROP: u8 = b'P';
const NODE_ARRAY: u8 = b'a';
const NODE_COLUMN: u8 = b'A';

/// Width of one child-offset slot (padded varint, covers offsets < 2^35).
const CHILD_SLOT_WIDTH: usize = 5;

// ── Build tree ─────────────────────────────────────────────────────

#[derive(Debug)]
struct BuildNode {
    kind: u8,
    field_type: Marker,
    /// Offset of the field's type marker in the record (container begin
    /// marker for containers, slot offset for column elements). Unused
    /// for null/true/false.
    value_off: u64,
    /// Offset of the pair's key-length varint; prop nodes only.
    key_off: u64,
    children: Vec<BuildNode>,
}

impl BuildNode {
    fn stores_value_off(&self) -> bool {
        !matches!(self.field_type, Marker::Null | Marker::True | Marker::False)
    }

    fn stores_children(&self) -> bool {
        self.kind != NODE_COLUMN && self.field_type.is_container_begin()
    }
}

/// A value located through the index. Null/true/false fields carry no
/// stored offset; their value is implied by the type itself.
#[derive(Debug, Clone)]
pub enum IndexedValue<'r> {
    Field(FieldAccess<'r>),
    ZeroPayload(Marker),
    ColumnSlot { column: ColumnCursor<'r>, index: u64 },
}

// ── PathIndex ──────────────────────────────────────────────────────

/// An offset-addressed mirror of one record revision, in its own buffer.
/// Dropping the index never affects the record.
#[derive(Debug, Clone)]
pub struct PathIndex {
    buf: MemBuf,
}

impl PathIndex {
    /// Build an index over `record` by traversing its tree depth first.
    pub fn build(record: &Record) -> Result<Self> {
        let bytes = record.as_bytes();
        let root_off = record.payload_offset()?;
        let root_frame = Frame::parse_at(bytes, root_off)?;
        let root = build_container_node(bytes, NODE_ARRAY, &root_frame, 0)?;

        let mut buf = MemBuf::new();
        let key_len = key::key_block_len(bytes)?;
        buf.write(&bytes[..key_len])?;
        buf.write(&record.commit_hash()?.to_le_bytes())?;
        flatten_node(&mut buf, &root)?;

        tracing::debug!(
            record_bytes = bytes.len(),
            index_bytes = buf.len(),
            "path index built"
        );
        Ok(Self { buf })
    }

    /// Open an index over existing bytes (prologue and root node are
    /// checked; node structure is validated as it is walked).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let root_at = key::payload_offset(&bytes)?;
        let root_kind = *bytes.get(root_at).ok_or(RecordError::OutOfBounds(root_at))?;
        if root_kind != NODE_ARRAY {
            return Err(RecordError::Corrupted(format!(
                "index root node has kind 0x{:02x}",
                root_kind
            )));
        }
        Ok(Self { buf: MemBuf::from_vec(bytes) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_vec()
    }

    /// The indexed record's key.
    pub fn key(&self) -> Result<key::RecordKey> {
        key::read_key_at(self.buf.as_slice())
    }

    /// The indexed record revision's commit hash.
    pub fn commit_hash(&self) -> Result<u64> {
        key::commit_hash_read(self.buf.as_slice())
    }

    /// Verify the index belongs to `record`: key block and commit hash
    /// must both match. `NotIndexed` otherwise.
    pub fn bind(&self, record: &Record) -> Result<()> {
        let my_key_len = key::key_block_len(self.buf.as_slice())?;
        let rec_key_len = key::key_block_len(record.as_bytes())?;
        if self.buf.as_slice()[..my_key_len] != record.as_bytes()[..rec_key_len] {
            return Err(RecordError::NotIndexed("key mismatch".into()));
        }
        if self.commit_hash()? != record.commit_hash()? {
            return Err(RecordError::NotIndexed("commit hash mismatch".into()));
        }
        Ok(())
    }

    /// Resolve `path` against `record` through the index: O(depth)
    /// container hops, each child reached through the node offset table.
    pub fn resolve<'r>(&self, path: &DotPath, record: &'r Record) -> Result<IndexedValue<'r>> {
        self.bind(record)?;
        if path.is_empty() {
            return Err(RecordError::NotResolvable("empty path".into()));
        }
        let index_bytes = self.buf.as_slice();
        let mut node = NodeRef::parse(index_bytes, key::payload_offset(index_bytes)?)?;

        let segments = path.segments();
        for (depth, segment) in segments.iter().enumerate() {
            if !node.has_children() {
                return Err(RecordError::NotResolvable(format!(
                    "segment '{}' descends into a {}",
                    segment_name(segment),
                    node.field_type.type_name()
                )));
            }
            let child_at = match segment {
                PathSegment::Index(i) => {
                    if *i >= node.nchildren {
                        return Err(RecordError::NotResolvable(format!(
                            "index {} out of range ({} children)",
                            i, node.nchildren
                        )));
                    }
                    if node.field_type.base_kind() == Marker::ObjectBegin {
                        return Err(RecordError::NotResolvable(
                            "index segment against an object".into(),
                        ));
                    }
                    if node.field_type.is_column_begin() {
                        // Column children are slots addressed through the
                        // column node itself.
                        if depth + 1 != segments.len() {
                            return Err(RecordError::NotResolvable(
                                "column values hold no nested containers".into(),
                            ));
                        }
                        let col_off = node.value_off.expect("column nodes store their offset");
                        let column = ColumnCursor::open_at(record.as_bytes(), col_off as usize)?;
                        return Ok(IndexedValue::ColumnSlot { column, index: *i });
                    }
                    node.child_offset(index_bytes, *i)?
                }
                PathSegment::Key(name) => {
                    if node.field_type.base_kind() != Marker::ObjectBegin {
                        return Err(RecordError::NotResolvable(format!(
                            "key segment '{}' against a {}",
                            name,
                            node.field_type.type_name()
                        )));
                    }
                    self.find_prop_child(index_bytes, &node, record.as_bytes(), name)?
                }
            };
            node = NodeRef::parse(index_bytes, child_at)?;
        }

        // Terminal node → a value in the record.
        match node.value_off {
            Some(off) => Ok(IndexedValue::Field(FieldAccess::at(record.as_bytes(), off as usize)?)),
            None => Ok(IndexedValue::ZeroPayload(node.field_type)),
        }
    }

    /// First 'P' child whose key in the record equals `name`.
    fn find_prop_child(
        &self,
        index_bytes: &[u8],
        node: &NodeRef,
        record_bytes: &[u8],
        name: &str,
    ) -> Result<usize> {
        for i in 0..node.nchildren {
            let child_at = node.child_offset(index_bytes, i)?;
            let child = NodeRef::parse(index_bytes, child_at)?;
            let key_off = child.key_off.ok_or_else(|| {
                RecordError::Corrupted("object child node without key offset".into())
            })?;
            let (child_key, _) = scalars::read_string_payload(record_bytes, key_off as usize)?;
            if child_key.as_bytes() == name.as_bytes() {
                return Ok(child_at);
            }
        }
        Err(RecordError::NotResolvable(format!("key '{}' not found", name)))
    }

    /// Human-readable dump of the node tree, for debugging and tests.
    pub fn to_string_tree(&self) -> Result<String> {
        let bytes = self.buf.as_slice();
        let mut out = String::new();
        dump_node(bytes, key::payload_offset(bytes)?, 0, &mut out)?;
        Ok(out)
    }
}

fn segment_name(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Key(k) => k.clone(),
        PathSegment::Index(i) => i.to_string(),
    }
}

// ── Building ───────────────────────────────────────────────────────

/// Build the node for a container field (the container's own node, with
/// one child node per element/pair/slot).
fn build_container_node(
    bytes: &[u8],
    kind: u8,
    frame: &Frame,
    key_off: u64,
) -> Result<BuildNode> {
    let mut node = BuildNode {
        kind,
        field_type: frame.marker,
        value_off: frame.begin as u64,
        key_off,
        children: Vec::new(),
    };

    if let Some(col_kind) = frame.column_kind() {
        for i in 0..frame.count {
            let slot = frame.region_start as u64 + i * col_kind.width() as u64;
            node.children.push(BuildNode {
                kind: NODE_COLUMN,
                field_type: frame.marker,
                value_off: slot,
                key_off: 0,
                children: Vec::new(),
            });
        }
        return Ok(node);
    }

    let is_object = frame.marker.is_object_begin();
    let mut off = frame.region_start;
    for _ in 0..frame.count {
        let (child_kind, pair_key_off) = if is_object {
            let key_at = off as u64;
            off += scalars::string_payload_len(bytes, off)?;
            (NODE_PROP, key_at)
        } else {
            (NODE_ARRAY, 0)
        };
        node.children.push(build_field_node(bytes, child_kind, off, pair_key_off)?);
        off += containers::field_len(bytes, off)?;
    }
    Ok(node)
}

/// Build the node for one field at `at` (marker offset).
fn build_field_node(bytes: &[u8], kind: u8, at: usize, key_off: u64) -> Result<BuildNode> {
    let marker = Marker::try_from_u8(bytes[at])?;
    if marker.is_container_begin() {
        let frame = Frame::parse_at(bytes, at)?;
        build_container_node(bytes, kind, &frame, key_off)
    } else {
        Ok(BuildNode { kind, field_type: marker, value_off: at as u64, key_off, children: Vec::new() })
    }
}

// ── Flattening ─────────────────────────────────────────────────────

/// Append a node (and its subtree) at the buffer cursor, back-patching
/// the child-offset table as each child lands. Returns the node's offset.
fn flatten_node(buf: &mut MemBuf, node: &BuildNode) -> Result<u64> {
    let start = buf.tell() as u64;
    buf.write_byte(node.kind)?;
    buf.write_byte(node.field_type.as_u8())?;
    if node.stores_value_off() {
        varint::write_varint(buf, node.value_off)?;
    }
    if node.kind == NODE_PROP {
        varint::write_varint(buf, node.key_off)?;
    }
    if node.stores_children() {
        varint::write_varint(buf, node.children.len() as u64)?;
        let table = buf.tell();
        for _ in 0..node.children.len() {
            varint::write_varint_padded(buf, 0, CHILD_SLOT_WIDTH)?;
        }
        for (i, child) in node.children.iter().enumerate() {
            let child_off = flatten_node(buf, child)?;
            varint::patch_varint_padded(buf, table + i * CHILD_SLOT_WIDTH, child_off, CHILD_SLOT_WIDTH)?;
        }
    }
    Ok(start)
}

// ── Walking ────────────────────────────────────────────────────────

/// Parsed view of one on-buffer node.
#[derive(Debug, Clone)]
struct NodeRef {
    kind: u8,
    field_type: Marker,
    value_off: Option<u64>,
    key_off: Option<u64>,
    nchildren: u64,
    table_off: usize,
}

impl NodeRef {
    fn parse(bytes: &[u8], at: usize) -> Result<Self> {
        let kind = *bytes.get(at).ok_or(RecordError::OutOfBounds(at))?;
        if !matches!(kind, NODE_PROP | NODE_ARRAY | NODE_COLUMN) {
            return Err(RecordError::Corrupted(format!("unknown node kind 0x{:02x}", kind)));
        }
        let ft_byte = *bytes.get(at + 1).ok_or(RecordError::OutOfBounds(at + 1))?;
        let field_type = Marker::try_from_u8(ft_byte)?;
        let mut off = at + 2;

        let value_off = if matches!(field_type, Marker::Null | Marker::True | Marker::False) {
            None
        } else {
            let (v, n) = varint::decode_at(bytes, off)?;
            off += n;
            Some(v)
        };
        let key_off = if kind == NODE_PROP {
            let (v, n) = varint::decode_at(bytes, off)?;
            off += n;
            Some(v)
        } else {
            None
        };
        let (nchildren, table_off) = if kind != NODE_COLUMN && field_type.is_container_begin() {
            let (n, len) = varint::decode_at(bytes, off)?;
            (n, off + len)
        } else {
            (0, off)
        };
        Ok(Self { kind, field_type, value_off, key_off, nchildren, table_off })
    }

    fn has_children(&self) -> bool {
        self.kind != NODE_COLUMN && self.field_type.is_container_begin()
    }

    fn child_offset(&self, bytes: &[u8], i: u64) -> Result<usize> {
        let slot = self.table_off + i as usize * CHILD_SLOT_WIDTH;
        let (off, _) = varint::decode_at(bytes, slot)?;
        Ok(off as usize)
    }
}

fn dump_node(bytes: &[u8], at: usize, depth: usize, out: &mut String) -> Result<()> {
    let node = NodeRef::parse(bytes, at)?;
    out.push('\n');
    for _ in 0..depth {
        out.push_str("    ");
    }
    out.push(node.kind as char);
    out.push('[');
    out.push(node.field_type.as_u8() as char);
    out.push(']');
    if let Some(v) = node.value_off {
        out.push_str(&format!("(0x{:x})", v));
    }
    if let Some(k) = node.key_off {
        out.push_str(&format!("{{key@0x{:x}}}", k));
    }
    if node.has_children() {
        for i in 0..node.nchildren {
            dump_node(bytes, node.child_offset(bytes, i)?, depth + 1, out)?;
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::key::RecordKey;
    use crate::record::marker::ColumnKind;
    use crate::record::revision::Revision;
    use serde_json::json;

    fn s1_record() -> Record {
        Record::from_json(RecordKey::Unsigned(42), &json!([1, "hi", null, true])).unwrap()
    }

    #[test]
    fn test_index_prologue_copies_key_and_hash() {
        let record = s1_record();
        let index = PathIndex::build(&record).unwrap();

        assert_eq!(index.key().unwrap(), RecordKey::Unsigned(42));
        assert_eq!(index.commit_hash().unwrap(), record.commit_hash().unwrap());
        let key_len = key::key_block_len(record.as_bytes()).unwrap();
        assert_eq!(&index.as_bytes()[..key_len], &record.as_bytes()[..key_len]);
    }

    #[test]
    fn test_bind_matches_same_revision_only() {
        let record = s1_record();
        let index = PathIndex::build(&record).unwrap();
        index.bind(&record).unwrap();

        // A committed revision detaches the index.
        let mut rev = Revision::begin(&record).unwrap();
        rev.set_u8(&DotPath::parse("0").unwrap(), 2).unwrap();
        let (revised, _) = rev.end().unwrap();
        assert!(matches!(
            index.bind(&revised).unwrap_err(),
            RecordError::NotIndexed(_)
        ));

        // A different key detaches it too.
        let other = Record::from_json(RecordKey::Unsigned(7), &json!([1, "hi", null, true])).unwrap();
        assert!(matches!(index.bind(&other).unwrap_err(), RecordError::NotIndexed(_)));
    }

    #[test]
    fn test_resolve_scalar_offsets() {
        let record = s1_record();
        let index = PathIndex::build(&record).unwrap();

        // Element 0: u8 payload right behind the marker the node points at.
        match index.resolve(&DotPath::parse("0").unwrap(), &record).unwrap() {
            IndexedValue::Field(f) => {
                assert_eq!(f.marker(), Marker::U8);
                assert_eq!(f.as_u8().unwrap(), 1);
            }
            other => panic!("expected field, got {:?}", other),
        }

        // Element 3: zero-payload true, implied by the node's type byte.
        match index.resolve(&DotPath::parse("3").unwrap(), &record).unwrap() {
            IndexedValue::ZeroPayload(m) => assert_eq!(m, Marker::True),
            other => panic!("expected zero-payload, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_object_prop_via_key_offset() {
        // Duplicate keys built through the inserter; json! would collapse
        // them.
        let mut ins = Record::builder(RecordKey::None, 0).unwrap();
        ins.begin_object(0).unwrap();
        ins.prop_unsigned("a", 1).unwrap();
        ins.prop_unsigned("a", 2).unwrap();
        ins.prop_begin_object("deep", 0).unwrap();
        ins.prop_string("x", "y").unwrap();
        ins.end().unwrap();
        ins.end().unwrap();
        let record = ins.finish().unwrap();
        let index = PathIndex::build(&record).unwrap();

        // Duplicate keys: the first occurrence wins.
        match index.resolve(&DotPath::parse("0.a").unwrap(), &record).unwrap() {
            IndexedValue::Field(f) => assert_eq!(f.as_unsigned().unwrap(), 1),
            other => panic!("expected field, got {:?}", other),
        }
        match index.resolve(&DotPath::parse("0.deep.x").unwrap(), &record).unwrap() {
            IndexedValue::Field(f) => assert_eq!(f.as_string().unwrap(), "y"),
            other => panic!("expected field, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_column_slot() {
        let mut ins = Record::builder(RecordKey::None, 0).unwrap();
        ins.begin_column(ColumnKind::U8, 0).unwrap();
        ins.col_push_unsigned(10).unwrap();
        ins.col_push_null().unwrap();
        ins.end().unwrap();
        let record = ins.finish().unwrap();
        let index = PathIndex::build(&record).unwrap();

        match index.resolve(&DotPath::parse("0.1").unwrap(), &record).unwrap() {
            IndexedValue::ColumnSlot { column, index } => {
                assert_eq!(index, 1);
                assert!(column.value_is_null(index).unwrap());
            }
            other => panic!("expected column slot, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_failures() {
        let record = s1_record();
        let index = PathIndex::build(&record).unwrap();
        for bad in ["9", "0.0", "missing"] {
            let err = index.resolve(&DotPath::parse(bad).unwrap(), &record).unwrap_err();
            assert!(matches!(err, RecordError::NotResolvable(_)), "path '{}': {:?}", bad, err);
        }
    }

    #[test]
    fn test_index_agrees_with_record_evaluator() {
        let value = json!([
            {"name": "n1", "vals": [1, 2, 3], "meta": {"ok": true}},
            [null, "s", -5],
            7
        ]);
        let record = Record::from_json(RecordKey::String("doc".into()), &value).unwrap();
        let index = PathIndex::build(&record).unwrap();

        for p in ["0.name", "0.vals.2", "0.meta.ok", "1.1", "1.2", "2"] {
            let dot = DotPath::parse(p).unwrap();
            let direct = record.get(&dot).unwrap();
            let via_index = match index.resolve(&dot, &record).unwrap() {
                IndexedValue::Field(f) => crate::record::field_to_json(&f).unwrap(),
                IndexedValue::ZeroPayload(Marker::Null) => json!(null),
                IndexedValue::ZeroPayload(Marker::True) => json!(true),
                IndexedValue::ZeroPayload(Marker::False) => json!(false),
                IndexedValue::ZeroPayload(m) => panic!("unexpected zero-payload {:?}", m),
                IndexedValue::ColumnSlot { .. } => panic!("no columns in this record"),
            };
            assert_eq!(direct, via_index, "path '{}'", p);
        }
    }

    #[test]
    fn test_index_roundtrips_through_bytes() {
        let record = s1_record();
        let index = PathIndex::build(&record).unwrap();
        let reopened = PathIndex::from_bytes(index.as_bytes().to_vec()).unwrap();
        reopened.bind(&record).unwrap();
        match reopened.resolve(&DotPath::parse("1").unwrap(), &record).unwrap() {
            IndexedValue::Field(f) => assert_eq!(f.as_string().unwrap(), "hi"),
            other => panic!("expected field, got {:?}", other),
        }
    }

    #[test]
    fn test_string_tree_dump_shape() {
        let record = s1_record();
        let index = PathIndex::build(&record).unwrap();
        let dump = index.to_string_tree().unwrap();
        assert!(dump.contains("a[["), "root node: {}", dump);
        assert!(dump.contains("a[c]"), "u8 element node: {}", dump);
        assert!(dump.contains("a[t]"), "true element node: {}", dump);
    }

    #[test]
    fn test_dropping_index_leaves_record() {
        let record = s1_record();
        let bytes_before = record.as_bytes().to_vec();
        {
            let _index = PathIndex::build(&record).unwrap();
        }
        assert_eq!(record.as_bytes(), &bytes_before[..]);
    }
}
