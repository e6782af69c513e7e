//! bindoc — columnar binary format for JSON-like documents.
//!
//! A record encodes an ordered, heterogeneous tree (objects, arrays, typed
//! columns, scalars) in one contiguous byte buffer: a key block, a 64-bit
//! commit hash, and a root array framed by begin/end markers with
//! varint-encoded counts and capacities. The format is self-describing and
//! position-addressable; cursors navigate it in place without
//! materializing a parsed tree.
//!
//! Layers, bottom up:
//!
//! - [`membuf::MemBuf`] — growable byte buffer with a cursor and a
//!   save/restore stack
//! - [`varint`] — base-128 varints, including width-changing in-place
//!   updates
//! - [`record::marker`] — the closed one-byte type/framing marker set
//! - [`record::cursor`] — array/object/column read cursors
//! - [`record::insert`] / [`record::edit`] — append and in-place mutation
//!   engines
//! - [`record::revision`] — copy-edit-commit sessions publishing a fresh
//!   commit hash
//! - [`record::index`] — offset-addressed path indexes bound to a record
//!   revision by key and commit hash
//!
//! ```
//! use bindoc::{DotPath, PathIndex, Record, RecordKey, Revision};
//! use serde_json::json;
//!
//! let base = Record::from_json(RecordKey::Unsigned(42), &json!([1, "hi", null, true]))?;
//!
//! let mut rev = Revision::begin(&base)?;
//! rev.set_float(&DotPath::parse("2")?, 3.5)?;
//! let (record, report) = rev.end()?;
//! assert_eq!(report.updates, 1);
//!
//! let index = PathIndex::build(&record)?;
//! index.bind(&record)?;
//! assert_eq!(record.get(&DotPath::parse("2")?)?, json!(3.5));
//! # Ok::<(), bindoc::RecordError>(())
//! ```
//!
//! Records are single-writer: reader/writer exclusion across clones is the
//! caller's responsibility, and no operation blocks or locks.

pub mod error;
pub mod membuf;
pub mod record;
pub mod varint;

pub use error::{RecordError, Result};
pub use membuf::MemBuf;
pub use record::cursor::{ArrayCursor, ColumnCursor, ColumnEntry, FieldAccess, ObjectCursor};
pub use record::index::{IndexedValue, PathIndex};
pub use record::key::{KeyKind, RecordKey};
pub use record::marker::{ColumnKind, DerivedKind, Marker};
pub use record::path::{DotPath, PathSegment, PathValue};
pub use record::revision::{ReviseReport, Revision, RevisionState};
pub use record::scalars::BinaryRef;
pub use record::Record;
