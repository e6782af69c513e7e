//! Compiled dot paths and their evaluation against a record.
//!
//! A compiled path is an ordered list of segments, each a property key or
//! an element index. Evaluation opens the root array and walks one
//! container per segment: index segments step arrays and columns, key
//! segments scan object properties for the first exact byte match.
//! Anything else (wrong container kind for a segment, out-of-range index,
//! missing key, descending into a scalar) fails with `NotResolvable`.
//!
//! `DotPath::parse` is a convenience splitter for the common `a.b.0` form;
//! a full path grammar with quoting lives outside this crate.

use std::fmt;

use crate::error::{RecordError, Result};
use crate::record::containers::{self, Frame};
use crate::record::cursor::{ColumnCursor, FieldAccess};
use crate::record::scalars;

// ── Path model ─────────────────────────────────────────────────────

/// One step of a compiled dot path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Property lookup in an object (first occurrence on duplicates).
    Key(String),
    /// Element lookup in an array or column.
    Index(u64),
}

/// A compiled dot path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DotPath {
    segments: Vec<PathSegment>,
}

impl DotPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a `a.b.0`-style path. All-digit segments compile to `Index`,
    /// everything else to `Key`. Empty input and empty segments are not
    /// resolvable paths.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(RecordError::NotResolvable("empty path".into()));
        }
        let mut segments = Vec::new();
        for part in input.split('.') {
            if part.is_empty() {
                return Err(RecordError::NotResolvable(format!(
                    "empty segment in path '{}'",
                    input
                )));
            }
            if part.bytes().all(|b| b.is_ascii_digit()) {
                let idx = part.parse::<u64>().map_err(|_| {
                    RecordError::NotResolvable(format!("index overflow in path '{}'", input))
                })?;
                segments.push(PathSegment::Index(idx));
            } else {
                segments.push(PathSegment::Key(part.to_string()));
            }
        }
        Ok(Self { segments })
    }

    /// Append a key segment.
    pub fn push_key(&mut self, name: impl Into<String>) -> &mut Self {
        self.segments.push(PathSegment::Key(name.into()));
        self
    }

    /// Append an index segment.
    pub fn push_index(&mut self, index: u64) -> &mut Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl From<Vec<PathSegment>> for DotPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match seg {
                PathSegment::Key(k) => f.write_str(k)?,
                PathSegment::Index(idx) => write!(f, "{}", idx)?,
            }
        }
        Ok(())
    }
}

// ── Evaluation results ─────────────────────────────────────────────

/// A resolved read target: a regular field, or one slot of a column.
#[derive(Debug, Clone)]
pub enum PathValue<'r> {
    Field(FieldAccess<'r>),
    ColumnSlot { column: ColumnCursor<'r>, index: u64 },
}

/// A resolved mutation target: the element plus every enclosing container
/// frame, outermost first, ending with the container that directly holds
/// the element. Any buffer mutation invalidates it.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedTarget {
    /// Enclosing container frames above `container`, outermost first.
    pub ancestors: Vec<Frame>,
    /// The container directly holding the element.
    pub container: Frame,
    /// Element (or pair, or slot) index inside `container`.
    pub index: u64,
    /// Offset of the element's type marker; for columns, of the value
    /// slot; for objects, of the pair's value marker.
    pub elem_off: usize,
    /// For object containers: offset of the pair start (key varint).
    pub pair_off: Option<usize>,
}

// ── Evaluator ──────────────────────────────────────────────────────

/// Walk `path` against the container tree rooted at `root_off`.
pub(crate) fn resolve(bytes: &[u8], root_off: usize, path: &DotPath) -> Result<ResolvedTarget> {
    if path.is_empty() {
        return Err(RecordError::NotResolvable("empty path".into()));
    }
    let mut ancestors: Vec<Frame> = Vec::new();
    let mut container = Frame::parse_at(bytes, root_off)?;
    if !container.marker.is_array_begin() {
        return Err(RecordError::Corrupted("root container is not an array".into()));
    }

    let segments = path.segments();
    for (depth, segment) in segments.iter().enumerate() {
        let last = depth + 1 == segments.len();
        let base = container.marker.base_kind();

        let (index, pair_off, elem_off) = if base.is_array_begin() {
            let idx = match segment {
                PathSegment::Index(i) => *i,
                PathSegment::Key(k) => {
                    return Err(RecordError::NotResolvable(format!(
                        "key segment '{}' against an array",
                        k
                    )))
                }
            };
            if idx >= container.count {
                return Err(RecordError::NotResolvable(format!(
                    "index {} out of range ({} elements)",
                    idx, container.count
                )));
            }
            (idx, None, containers::element_offset(bytes, &container, idx)?)
        } else if base.is_object_begin() {
            let name = match segment {
                PathSegment::Key(k) => k.as_str(),
                PathSegment::Index(i) => {
                    return Err(RecordError::NotResolvable(format!(
                        "index segment {} against an object",
                        i
                    )))
                }
            };
            match scan_object(bytes, &container, name)? {
                Some((idx, pair_off, value_off)) => (idx, Some(pair_off), value_off),
                None => {
                    return Err(RecordError::NotResolvable(format!("key '{}' not found", name)))
                }
            }
        } else {
            // Column: index segments only, and always terminal.
            let kind = container.column_kind().expect("container is a column");
            let idx = match segment {
                PathSegment::Index(i) => *i,
                PathSegment::Key(k) => {
                    return Err(RecordError::NotResolvable(format!(
                        "key segment '{}' against a column",
                        k
                    )))
                }
            };
            if idx >= container.count {
                return Err(RecordError::NotResolvable(format!(
                    "index {} out of range ({} values)",
                    idx, container.count
                )));
            }
            if !last {
                return Err(RecordError::NotResolvable(
                    "column values hold no nested containers".into(),
                ));
            }
            let slot = container.region_start + idx as usize * kind.width();
            return Ok(ResolvedTarget {
                ancestors,
                container,
                index: idx,
                elem_off: slot,
                pair_off: None,
            });
        };

        if last {
            return Ok(ResolvedTarget { ancestors, container, index, elem_off, pair_off });
        }

        // Descend: the element must itself be a container.
        let next = Frame::parse_at(bytes, elem_off).map_err(|e| match e {
            RecordError::TypeMismatch { found, .. } => RecordError::NotResolvable(format!(
                "segment {} of '{}' lands on a {}",
                depth, path, found
            )),
            other => other,
        })?;
        ancestors.push(container);
        container = next;
    }
    unreachable!("loop returns on the last segment")
}

/// Find the first pair whose key equals `name` (exact byte compare).
/// Returns (pair index, pair offset, value marker offset).
fn scan_object(bytes: &[u8], frame: &Frame, name: &str) -> Result<Option<(u64, usize, usize)>> {
    let mut off = frame.region_start;
    for idx in 0..frame.count {
        let (key, key_len) = scalars::read_string_payload(bytes, off)?;
        if key.as_bytes() == name.as_bytes() {
            return Ok(Some((idx, off, off + key_len)));
        }
        off += key_len + containers::field_len(bytes, off + key_len)?;
    }
    Ok(None)
}

/// Resolve `path` for reading, yielding a field access or a column slot.
pub(crate) fn resolve_value<'r>(
    bytes: &'r [u8],
    root_off: usize,
    path: &DotPath,
) -> Result<PathValue<'r>> {
    let target = resolve(bytes, root_off, path)?;
    if target.container.column_kind().is_some() {
        let column = ColumnCursor::open_at(bytes, target.container.begin)?;
        Ok(PathValue::ColumnSlot { column, index: target.index })
    } else {
        Ok(PathValue::Field(FieldAccess::at(bytes, target.elem_off)?))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
