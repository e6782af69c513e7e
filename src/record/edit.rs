//! Positioned update, insert, and remove engine.
//!
//! All mutations resolve a dot path to a target element, splice bytes at
//! the element site, and then reconcile the framing varints: the target
//! container's count and capacity first, then every enclosing container's
//! capacity, innermost to outermost, folding in the shifts produced when a
//! varint changes width.
//!
//! Same-type fixed-width updates overwrite the payload in place. Anything
//! that changes the element's encoded length (string growth, a different
//! type marker) is a splice: the buffer tail shifts by the length delta.
//! Column slots are fixed-width, so column updates always rewrite the slot
//! in place and column removal writes the null sentinel; the slots are
//! reclaimed on `compact`.

use serde_json::Value;

use crate::error::{RecordError, Result};
use crate::membuf::MemBuf;
use crate::record::containers::{self, Frame};
use crate::record::insert::Inserter;
use crate::record::marker::{ColumnKind, Marker, BOOL_FALSE, BOOL_TRUE};
use crate::record::path::{self, DotPath, ResolvedTarget};
use crate::record::scalars;
use crate::record::insert_json_element;
use crate::varint;

// ── New values ─────────────────────────────────────────────────────

/// A value being written by the edit engine.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NewValue<'a> {
    Null,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f32),
    Str(&'a str),
    Binary { bytes: &'a [u8], mime: &'a str },
    UserBinary { bytes: &'a [u8], tag: &'a str },
    /// An arbitrary JSON subtree, encoded through the insertion engine.
    Json(&'a Value),
}

impl<'a> NewValue<'a> {
    /// Encode as a standalone element (type marker + payload).
    fn element_bytes(&self) -> Result<Vec<u8>> {
        let mut ins = Inserter::fragment();
        match self {
            NewValue::Null => ins.push_null()?,
            NewValue::Bool(b) => ins.push_bool(*b)?,
            NewValue::U8(v) => ins.push_u8(*v)?,
            NewValue::U16(v) => ins.push_u16(*v)?,
            NewValue::U32(v) => ins.push_u32(*v)?,
            NewValue::U64(v) => ins.push_u64(*v)?,
            NewValue::I8(v) => ins.push_i8(*v)?,
            NewValue::I16(v) => ins.push_i16(*v)?,
            NewValue::I32(v) => ins.push_i32(*v)?,
            NewValue::I64(v) => ins.push_i64(*v)?,
            NewValue::Float(v) => ins.push_float(*v)?,
            NewValue::Str(s) => ins.push_string(s)?,
            NewValue::Binary { bytes, mime } => ins.push_binary(bytes, mime)?,
            NewValue::UserBinary { bytes, tag } => ins.push_user_binary(bytes, tag)?,
            NewValue::Json(v) => insert_json_element(&mut ins, v)?,
        }
        ins.finish_fragment()
    }

    /// Encode as a column slot of `kind`. `TypeMismatch` when the value
    /// does not belong in that column.
    fn column_slot(&self, kind: ColumnKind) -> Result<[u8; 8]> {
        let mut slot = [0u8; 8];
        let mismatch = || RecordError::TypeMismatch {
            expected: "value matching the column kind",
            found: kind.marker().type_name(),
        };
        match self {
            NewValue::Null => kind.write_null_sentinel(&mut slot),
            NewValue::Bool(b) => {
                if kind != ColumnKind::Bool {
                    return Err(mismatch());
                }
                slot[0] = if *b { BOOL_TRUE } else { BOOL_FALSE };
            }
            NewValue::Float(v) => {
                if kind != ColumnKind::Float {
                    return Err(mismatch());
                }
                slot[..4].copy_from_slice(&v.to_le_bytes());
            }
            NewValue::U8(v) => return NewValue::U64(*v as u64).column_slot(kind),
            NewValue::U16(v) => return NewValue::U64(*v as u64).column_slot(kind),
            NewValue::U32(v) => return NewValue::U64(*v as u64).column_slot(kind),
            NewValue::U64(v) => {
                if !kind.is_unsigned() {
                    return Err(mismatch());
                }
                let w = kind.width();
                if w < 8 && *v >= 1u64 << (8 * w) {
                    return Err(mismatch());
                }
                slot[..w].copy_from_slice(&v.to_le_bytes()[..w]);
            }
            NewValue::I8(v) => return NewValue::I64(*v as i64).column_slot(kind),
            NewValue::I16(v) => return NewValue::I64(*v as i64).column_slot(kind),
            NewValue::I32(v) => return NewValue::I64(*v as i64).column_slot(kind),
            NewValue::I64(v) => {
                if !kind.is_signed() {
                    return Err(mismatch());
                }
                let w = kind.width();
                let fits = match w {
                    1 => i8::try_from(*v).is_ok(),
                    2 => i16::try_from(*v).is_ok(),
                    4 => i32::try_from(*v).is_ok(),
                    _ => true,
                };
                if !fits {
                    return Err(mismatch());
                }
                slot[..w].copy_from_slice(&v.to_le_bytes()[..w]);
            }
            NewValue::Json(Value::Null) => kind.write_null_sentinel(&mut slot),
            NewValue::Json(Value::Bool(b)) => return NewValue::Bool(*b).column_slot(kind),
            NewValue::Json(Value::Number(n)) => {
                return if let Some(u) = n.as_u64() {
                    NewValue::U64(u).column_slot(kind)
                } else if let Some(i) = n.as_i64() {
                    NewValue::I64(i).column_slot(kind)
                } else {
                    NewValue::Float(n.as_f64().unwrap_or(f64::NAN) as f32).column_slot(kind)
                };
            }
            _ => return Err(mismatch()),
        }
        Ok(slot)
    }
}

// ── Framing reconciliation ─────────────────────────────────────────

/// Patch the target container's framing varints and bump every ancestor's
/// capacity by the container's total byte growth.
///
/// `content_byte_delta` is the signed byte change inside the container's
/// region; shifts from widening/narrowing varints are folded in on the way
/// out. Ancestors are always arrays or objects (columns hold no
/// containers), so their capacities are byte counts.
fn reframe(
    buf: &mut MemBuf,
    ancestors: &[Frame],
    container: &Frame,
    new_count: u64,
    new_cap: u64,
    content_byte_delta: i64,
) -> Result<()> {
    let mut outer_delta = content_byte_delta;
    // cap_off sits after count_off; patch it first so the count patch
    // cannot move it.
    outer_delta += varint::update_varint(buf, container.cap_off, new_cap)?;
    outer_delta += varint::update_varint(buf, container.count_off, new_count)?;
    for ancestor in ancestors.iter().rev() {
        if outer_delta == 0 {
            break;
        }
        let new_anc_cap = (ancestor.cap as i64 + outer_delta) as u64;
        outer_delta += varint::update_varint(buf, ancestor.cap_off, new_anc_cap)?;
    }
    Ok(())
}

// ── Update ─────────────────────────────────────────────────────────

/// Overwrite the field at `path` with `value`.
///
/// Same-type fixed-width values are patched in place; everything else is
/// spliced (remove + re-insert at the same position). Column slots are
/// rewritten in place, with `TypeMismatch` when the value does not fit
/// the column kind.
pub(crate) fn update_field(
    buf: &mut MemBuf,
    root_off: usize,
    dot_path: &DotPath,
    value: NewValue<'_>,
) -> Result<()> {
    let target = path::resolve(buf.as_slice(), root_off, dot_path)?;

    if let Some(kind) = target.container.column_kind() {
        let slot = value.column_slot(kind)?;
        return buf.patch(target.elem_off, &slot[..kind.width()]);
    }

    let new_bytes = value.element_bytes()?;
    let old_marker = Marker::try_from_u8(buf.as_slice()[target.elem_off])?;
    let new_marker = Marker::try_from_u8(new_bytes[0])?;

    if old_marker == new_marker {
        if let Some(width) = new_marker.fixed_value_size() {
            // Same-type fast path: overwrite the payload, no shifts.
            debug_assert_eq!(new_bytes.len(), 1 + width);
            return buf.patch(target.elem_off + 1, &new_bytes[1..]);
        }
    }
    splice_element(buf, &target, &new_bytes)
}

/// Replace the element at the resolved target with `new_bytes`, shifting
/// the buffer tail by the length delta and reconciling capacities. The
/// element count is unchanged.
fn splice_element(buf: &mut MemBuf, target: &ResolvedTarget, new_bytes: &[u8]) -> Result<()> {
    let old_len = containers::field_len(buf.as_slice(), target.elem_off)?;
    let new_len = new_bytes.len();
    if new_len > old_len {
        buf.insert_gap(target.elem_off + old_len, new_len - old_len)?;
    } else if new_len < old_len {
        buf.remove_gap(target.elem_off + new_len, old_len - new_len)?;
    }
    buf.patch(target.elem_off, new_bytes)?;

    let delta = new_len as i64 - old_len as i64;
    let new_cap = (target.container.cap as i64 + delta) as u64;
    reframe(buf, &target.ancestors, &target.container, target.container.count, new_cap, delta)
}

// ── Remove ─────────────────────────────────────────────────────────

/// Remove the field at `path`. Arrays and objects shift the tail left and
/// decrement the container count (for objects the whole pair goes);
/// columns overwrite the slot with the null sentinel and keep their count.
pub(crate) fn remove_field(buf: &mut MemBuf, root_off: usize, dot_path: &DotPath) -> Result<()> {
    let target = path::resolve(buf.as_slice(), root_off, dot_path)?;

    if let Some(kind) = target.container.column_kind() {
        let mut slot = [0u8; 8];
        kind.write_null_sentinel(&mut slot);
        return buf.patch(target.elem_off, &slot[..kind.width()]);
    }

    let start = target.pair_off.unwrap_or(target.elem_off);
    let value_len = containers::field_len(buf.as_slice(), target.elem_off)?;
    let total_len = (target.elem_off - start) + value_len;
    buf.remove_gap(start, total_len)?;

    let new_cap = (target.container.cap as i64 - total_len as i64) as u64;
    reframe(
        buf,
        &target.ancestors,
        &target.container,
        target.container.count - 1,
        new_cap,
        -(total_len as i64),
    )
}

// ── Insert at position ─────────────────────────────────────────────

/// Insert `value` at `index` of the container at `parent` (`None` means
/// the root array). Elements at and after `index` shift right; `index ==
/// count` appends. Inserts that fit in free capacity move only bytes
/// inside the region; otherwise the region grows by a buffer-tail shift.
pub(crate) fn insert_element_at(
    buf: &mut MemBuf,
    root_off: usize,
    parent: Option<&DotPath>,
    index: u64,
    value: NewValue<'_>,
) -> Result<()> {
    let (ancestors, container) = resolve_container(buf.as_slice(), root_off, parent)?;
    if index > container.count {
        return Err(RecordError::NotFound(format!(
            "insert position {} of {}",
            index, container.count
        )));
    }

    if let Some(kind) = container.column_kind() {
        let slot = value.column_slot(kind)?;
        return insert_column_slot(buf, &ancestors, &container, index, &slot[..kind.width()]);
    }
    if container.marker.base_kind() == Marker::ObjectBegin {
        return Err(RecordError::TypeMismatch {
            expected: "array container (objects take keyed inserts)",
            found: "object",
        });
    }
    let elem = value.element_bytes()?;
    insert_region_bytes(buf, &ancestors, &container, index, &elem)
}

/// Insert a `(key, value)` property at `index` of the object at `path`.
pub(crate) fn insert_prop_at(
    buf: &mut MemBuf,
    root_off: usize,
    object_path: Option<&DotPath>,
    index: u64,
    prop_key: &str,
    value: &Value,
) -> Result<()> {
    let (ancestors, container) = resolve_container(buf.as_slice(), root_off, object_path)?;
    if container.marker.base_kind() != Marker::ObjectBegin {
        return Err(RecordError::TypeMismatch {
            expected: "object",
            found: container.marker.type_name(),
        });
    }
    if index > container.count {
        return Err(RecordError::NotFound(format!(
            "insert position {} of {}",
            index, container.count
        )));
    }
    // A pair is the key string followed by an ordinary element.
    let mut tmp = MemBuf::new();
    scalars::write_string_payload(&mut tmp, prop_key)?;
    let mut frag = Inserter::fragment();
    insert_json_element(&mut frag, value)?;
    tmp.write(&frag.finish_fragment()?)?;
    insert_region_bytes(buf, &ancestors, &container, index, tmp.as_slice())
}

/// Resolve the container a positioned insert goes into.
fn resolve_container(
    bytes: &[u8],
    root_off: usize,
    parent: Option<&DotPath>,
) -> Result<(Vec<Frame>, Frame)> {
    match parent {
        None => Ok((Vec::new(), Frame::parse_at(bytes, root_off)?)),
        Some(p) => {
            let target = path::resolve(bytes, root_off, p)?;
            if target.container.column_kind().is_some() {
                return Err(RecordError::NotResolvable(
                    "column values hold no nested containers".into(),
                ));
            }
            let frame = Frame::parse_at(bytes, target.elem_off).map_err(|e| match e {
                RecordError::TypeMismatch { found, .. } => {
                    RecordError::NotResolvable(format!("path '{}' lands on a {}", p, found))
                }
                other => other,
            })?;
            let mut ancestors = target.ancestors;
            ancestors.push(target.container);
            Ok((ancestors, frame))
        }
    }
}

/// Place raw element/pair bytes at `index`, using free capacity when it
/// suffices and growing the region otherwise.
fn insert_region_bytes(
    buf: &mut MemBuf,
    ancestors: &[Frame],
    container: &Frame,
    index: u64,
    elem: &[u8],
) -> Result<()> {
    let insert_off = containers::element_offset(buf.as_slice(), container, index)?;
    let used = containers::used_bytes(buf.as_slice(), container)?;
    let used_end = container.region_start + used;
    let free = container.region_len() - used;
    let need = elem.len();

    if free >= need {
        // In-capacity insert: shift the following elements into the free
        // space; the buffer tail does not move.
        buf.move_range(insert_off, used_end - insert_off, insert_off + need)?;
        buf.patch(insert_off, elem)?;
        reframe(buf, ancestors, container, container.count + 1, container.cap, 0)
    } else {
        // Grow by the full element size; existing slack stays reserved.
        buf.insert_gap(insert_off, need)?;
        buf.patch(insert_off, elem)?;
        let new_cap = container.cap + need as u64;
        reframe(buf, ancestors, container, container.count + 1, new_cap, need as i64)
    }
}

/// Place a column slot at `index`, growing the region by one slot when no
/// free slots remain.
fn insert_column_slot(
    buf: &mut MemBuf,
    ancestors: &[Frame],
    container: &Frame,
    index: u64,
    slot: &[u8],
) -> Result<()> {
    let kind = container.column_kind().expect("column frame");
    let width = kind.width();
    let insert_off = container.region_start + index as usize * width;
    let used_end = container.region_start + container.count as usize * width;

    if container.count < container.cap {
        buf.move_range(insert_off, used_end - insert_off, insert_off + width)?;
        buf.patch(insert_off, slot)?;
        reframe(buf, ancestors, container, container.count + 1, container.cap, 0)
    } else {
        buf.insert_gap(insert_off, width)?;
        buf.patch(insert_off, slot)?;
        reframe(buf, ancestors, container, container.count + 1, container.cap + 1, width as i64)
    }
}

// ── Compaction ─────────────────────────────────────────────────────

/// Recursively trim every container's region to its live size, depth
/// first: free bytes are removed, capacities rewritten, and for columns
/// the capacity drops to the value count. Returns the signed size change
/// of the container at `at`.
pub(crate) fn compact(buf: &mut MemBuf, at: usize) -> Result<i64> {
    let frame = Frame::parse_at(buf.as_slice(), at)?;

    if let Some(kind) = frame.column_kind() {
        let free_slots = frame.cap - frame.count;
        if free_slots == 0 {
            return Ok(0);
        }
        let free_bytes = free_slots as usize * kind.width();
        let used_end = frame.region_start + frame.count as usize * kind.width();
        buf.remove_gap(used_end, free_bytes)?;
        let shift = varint::update_varint(buf, frame.cap_off, frame.count)?;
        return Ok(shift - free_bytes as i64);
    }

    let is_object = frame.marker.is_object_begin();
    let mut off = frame.region_start;
    let mut child_delta_total = 0i64;
    for _ in 0..frame.count {
        if is_object {
            off += scalars::string_payload_len(buf.as_slice(), off)?;
        }
        let marker = Marker::try_from_u8(buf.as_slice()[off])?;
        if marker.is_container_begin() {
            child_delta_total += compact(buf, off)?;
        }
        off += containers::field_len(buf.as_slice(), off)?;
    }

    // Physical region size after child compaction.
    let region_len = (frame.region_len() as i64 + child_delta_total) as usize;
    let used = off - frame.region_start;
    let free = region_len - used;
    if free > 0 {
        buf.remove_gap(off, free)?;
    }
    let shift = varint::update_varint(buf, frame.cap_off, used as u64)?;
    Ok(child_delta_total - free as i64 + shift)
}

// ── Tests ──────────────────────────────────────────────────────────
