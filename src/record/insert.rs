//! Insertion engine: append scalars and nested containers into a record
//! under the framing invariants.
//!
//! An `Inserter` keeps a stack of insertion frames, one per open
//! container; only the innermost frame accepts writes. `begin_*` writes a
//! container skeleton (begin marker, count varint 0, capacity varint at
//! the caller's hint, zeroed region, end marker) and pushes a frame;
//! `end` pops it, back-patching the count and capacity varints with the
//! varint-update primitive and repositioning the parent by the resulting
//! shift. Count and capacity of enclosing frames are reconciled when they
//! end themselves, by which time every inner frame has reported its final
//! size.

use crate::error::{RecordError, Result};
use crate::membuf::MemBuf;
use crate::record::containers::{self, Frame};
use crate::record::key::{self, RecordKey, COMMIT_HASH_SIZE};
use crate::record::marker::{ColumnKind, Marker, BOOL_FALSE, BOOL_TRUE};
use crate::record::scalars;
use crate::record::Record;
use crate::varint;

// ── Insertion frames ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// The record's root array; never popped by `end`.
    Root,
    Array,
    Object,
    Column(ColumnKind),
    /// Frameless scratch area used to encode standalone elements.
    Fragment,
}

#[derive(Debug, Clone)]
struct InsertFrame {
    kind: FrameKind,
    marker: Marker,
    begin: usize,
    count_off: usize,
    count: u64,
    cap_off: usize,
    /// Current region size: bytes for arrays/objects, slots for columns.
    cap: u64,
    region_start: usize,
    /// Next append offset inside the region.
    write_pos: usize,
    /// Total encoded size at creation, for parent capacity reconciliation.
    initial_total: usize,
}

impl InsertFrame {
    fn region_len(&self) -> usize {
        match self.kind {
            FrameKind::Column(k) => self.cap as usize * k.width(),
            _ => self.cap as usize,
        }
    }

    fn region_end(&self) -> usize {
        self.region_start + self.region_len()
    }

    fn free_bytes(&self) -> usize {
        self.region_end() - self.write_pos
    }

    fn total_len(&self) -> usize {
        // Region end plus the end marker byte.
        self.region_end() + 1 - self.begin
    }

    fn accepts_elements(&self) -> bool {
        matches!(self.kind, FrameKind::Root | FrameKind::Array | FrameKind::Fragment)
    }
}

// ── Inserter ───────────────────────────────────────────────────────

/// Builder for a record buffer. Exactly one frame accepts writes at any
/// time; parents are untouchable until their nested frame is ended.
#[derive(Debug)]
pub struct Inserter {
    buf: MemBuf,
    frames: Vec<InsertFrame>,
}

impl Inserter {
    /// Start building a record: key block, zeroed commit hash slot, root
    /// array skeleton with `cap_hint` reserved bytes.
    pub(crate) fn for_record(record_key: &RecordKey, cap_hint: u64) -> Result<Self> {
        let mut buf = MemBuf::new();
        key::write_key(&mut buf, record_key)?;
        buf.write(&[0u8; COMMIT_HASH_SIZE])?;
        let frame = containers::write_empty_frame(&mut buf, Marker::ArrayBegin, cap_hint)?;
        let root = InsertFrame {
            kind: FrameKind::Root,
            marker: Marker::ArrayBegin,
            begin: frame.begin,
            count_off: frame.count_off,
            count: 0,
            cap_off: frame.cap_off,
            cap: cap_hint,
            region_start: frame.region_start,
            write_pos: frame.region_start,
            initial_total: frame.total_len(),
        };
        Ok(Self { buf, frames: vec![root] })
    }

    /// Start a frameless fragment for encoding one standalone element
    /// (used by the positioned edit engine).
    pub(crate) fn fragment() -> Self {
        let fragment = InsertFrame {
            kind: FrameKind::Fragment,
            marker: Marker::Null,
            begin: 0,
            count_off: 0,
            count: 0,
            cap_off: 0,
            cap: 0,
            region_start: 0,
            write_pos: 0,
            initial_total: 0,
        };
        Self { buf: MemBuf::new(), frames: vec![fragment] }
    }

    fn top(&mut self) -> &mut InsertFrame {
        self.frames.last_mut().expect("inserter frame stack is never empty")
    }

    /// Depth of open containers (1 = only the root or fragment).
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    // ── Low-level region writes ────────────────────────────────────

    /// Make room for `need` more bytes at the top frame's write position,
    /// growing the region (buffer-tail shift) when free capacity is
    /// exhausted.
    fn ensure_room(&mut self, need: usize) -> Result<()> {
        let top = self.frames.last().expect("frame stack");
        if top.kind == FrameKind::Fragment {
            return Ok(());
        }
        let free = top.free_bytes();
        if free >= need {
            return Ok(());
        }
        let grow = need - free;
        let gap_at = top.region_end();
        self.buf.insert_gap(gap_at, grow)?;
        let top = self.top();
        match top.kind {
            FrameKind::Column(k) => {
                debug_assert_eq!(grow % k.width(), 0);
                top.cap += (grow / k.width()) as u64;
            }
            _ => top.cap += grow as u64,
        }
        Ok(())
    }

    /// Append raw element bytes at the top frame's write position.
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_room(bytes.len())?;
        let top = self.top();
        let at = top.write_pos;
        top.write_pos += bytes.len();
        if top.kind == FrameKind::Fragment {
            self.buf.seek(at)?;
            self.buf.write(bytes)
        } else {
            self.buf.patch(at, bytes)
        }
    }

    fn require_element_frame(&self) -> Result<()> {
        let top = self.frames.last().expect("frame stack");
        if !top.accepts_elements() {
            return Err(RecordError::InvalidState(match top.kind {
                FrameKind::Object => "object frame expects keyed inserts",
                FrameKind::Column(_) => "column frame expects column values",
                _ => "frame does not accept elements",
            }));
        }
        Ok(())
    }

    fn push_element(&mut self, bytes: &[u8]) -> Result<()> {
        self.require_element_frame()?;
        self.append(bytes)?;
        self.top().count += 1;
        Ok(())
    }

    // ── Scalar inserts (array context) ─────────────────────────────

    pub fn push_null(&mut self) -> Result<()> {
        self.push_element(&[Marker::Null.as_u8()])
    }

    pub fn push_true(&mut self) -> Result<()> {
        self.push_element(&[Marker::True.as_u8()])
    }

    pub fn push_false(&mut self) -> Result<()> {
        self.push_element(&[Marker::False.as_u8()])
    }

    pub fn push_bool(&mut self, value: bool) -> Result<()> {
        if value { self.push_true() } else { self.push_false() }
    }

    pub fn push_u8(&mut self, value: u8) -> Result<()> {
        self.push_element(&[Marker::U8.as_u8(), value])
    }

    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        let mut e = [Marker::U16.as_u8(), 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_element(&e)
    }

    pub fn push_u32(&mut self, value: u32) -> Result<()> {
        let mut e = [Marker::U32.as_u8(), 0, 0, 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_element(&e)
    }

    pub fn push_u64(&mut self, value: u64) -> Result<()> {
        let mut e = [Marker::U64.as_u8(), 0, 0, 0, 0, 0, 0, 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_element(&e)
    }

    pub fn push_i8(&mut self, value: i8) -> Result<()> {
        self.push_element(&[Marker::I8.as_u8(), value as u8])
    }

    pub fn push_i16(&mut self, value: i16) -> Result<()> {
        let mut e = [Marker::I16.as_u8(), 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_element(&e)
    }

    pub fn push_i32(&mut self, value: i32) -> Result<()> {
        let mut e = [Marker::I32.as_u8(), 0, 0, 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_element(&e)
    }

    pub fn push_i64(&mut self, value: i64) -> Result<()> {
        let mut e = [Marker::I64.as_u8(), 0, 0, 0, 0, 0, 0, 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_element(&e)
    }

    pub fn push_float(&mut self, value: f32) -> Result<()> {
        let mut e = [Marker::Float.as_u8(), 0, 0, 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_element(&e)
    }

    /// Insert an unsigned integer at the smallest fitting width.
    pub fn push_unsigned(&mut self, value: u64) -> Result<()> {
        let mut e = [0u8; 9];
        e[0] = scalars::unsigned_marker(value).as_u8();
        let w = scalars::encode_unsigned(value, scalars::unsigned_marker(value), &mut e[1..])?;
        self.push_element(&e[..1 + w])
    }

    /// Insert a signed integer at the smallest fitting width.
    pub fn push_signed(&mut self, value: i64) -> Result<()> {
        let mut e = [0u8; 9];
        e[0] = scalars::signed_marker(value).as_u8();
        let w = scalars::encode_signed(value, scalars::signed_marker(value), &mut e[1..])?;
        self.push_element(&e[..1 + w])
    }

    pub fn push_string(&mut self, value: &str) -> Result<()> {
        let mut tmp = MemBuf::new();
        tmp.write_byte(Marker::String.as_u8())?;
        scalars::write_string_payload(&mut tmp, value)?;
        self.push_element(tmp.as_slice())
    }

    pub fn push_binary(&mut self, bytes: &[u8], mime: &str) -> Result<()> {
        let mut tmp = MemBuf::new();
        tmp.write_byte(Marker::Binary.as_u8())?;
        scalars::write_binary_payload(&mut tmp, bytes, mime)?;
        self.push_element(tmp.as_slice())
    }

    pub fn push_user_binary(&mut self, bytes: &[u8], tag: &str) -> Result<()> {
        let mut tmp = MemBuf::new();
        tmp.write_byte(Marker::UserBinary.as_u8())?;
        scalars::write_user_binary_payload(&mut tmp, bytes, tag)?;
        self.push_element(tmp.as_slice())
    }

    // ── Nested containers (array context) ──────────────────────────

    /// Open a nested array with `cap_hint` reserved bytes.
    pub fn begin_array(&mut self, cap_hint: u64) -> Result<()> {
        self.begin_derived(Marker::ArrayBegin, cap_hint)
    }

    /// Open a nested object with `cap_hint` reserved bytes.
    pub fn begin_object(&mut self, cap_hint: u64) -> Result<()> {
        self.begin_derived(Marker::ObjectBegin, cap_hint)
    }

    /// Open a nested array or object with an explicit (possibly derived)
    /// begin marker.
    pub fn begin_derived(&mut self, marker: Marker, cap_hint: u64) -> Result<()> {
        if !marker.is_array_begin() && !marker.is_object_begin() {
            return Err(RecordError::TypeMismatch {
                expected: "array or object marker",
                found: marker.type_name(),
            });
        }
        self.require_element_frame()?;
        let kind = if marker.is_array_begin() { FrameKind::Array } else { FrameKind::Object };
        self.begin_container(marker, kind, cap_hint, None)
    }

    /// Open a nested column of `kind` with `cap_hint` reserved value slots.
    pub fn begin_column(&mut self, kind: ColumnKind, cap_hint: u64) -> Result<()> {
        self.require_element_frame()?;
        self.begin_container(kind.marker(), FrameKind::Column(kind), cap_hint, None)
    }

    fn begin_container(
        &mut self,
        marker: Marker,
        kind: FrameKind,
        cap_hint: u64,
        object_key: Option<&str>,
    ) -> Result<()> {
        // Encode the key (for object contexts) and the skeleton frame into
        // scratch, then place it as one element.
        let mut tmp = MemBuf::new();
        if let Some(k) = object_key {
            scalars::write_string_payload(&mut tmp, k)?;
        }
        let skeleton = containers::write_empty_frame(&mut tmp, marker, cap_hint)?;
        let skeleton_rel = skeleton.begin;

        self.ensure_room(tmp.len())?;
        let top = self.top();
        let at = top.write_pos;
        top.write_pos += tmp.len();
        top.count += 1;
        if top.kind == FrameKind::Fragment {
            self.buf.seek(at)?;
            self.buf.write(tmp.as_slice())?;
        } else {
            self.buf.patch(at, tmp.as_slice())?;
        }

        let child_begin = at + skeleton_rel;
        let frame = Frame::parse_at(self.buf.as_slice(), child_begin)?;
        self.frames.push(InsertFrame {
            kind,
            marker,
            begin: frame.begin,
            count_off: frame.count_off,
            count: 0,
            cap_off: frame.cap_off,
            cap: frame.cap,
            region_start: frame.region_start,
            write_pos: frame.region_start,
            initial_total: frame.total_len(),
        });
        Ok(())
    }

    /// Close the innermost container: back-patch its count and capacity
    /// varints (shifting the buffer tail when a varint widens) and hand
    /// control back to the parent frame.
    pub fn end(&mut self) -> Result<()> {
        if self.frames.len() < 2 {
            return Err(RecordError::InvalidState("no open nested container"));
        }
        let mut child = self.frames.pop().expect("checked depth");
        self.patch_frame_varints(&mut child)?;
        let final_total = child.total_len();

        let parent = self.top();
        parent.write_pos = child.begin + final_total;
        if parent.kind != FrameKind::Fragment {
            // The child (and, for objects, its key) grew the parent region
            // past the skeleton placed at begin time.
            parent.cap += (final_total - child.initial_total) as u64;
        }
        Ok(())
    }

    /// Patch a frame's count and capacity varints to their final values.
    /// Returns with the frame's offsets adjusted for any shifts.
    fn patch_frame_varints(&mut self, frame: &mut InsertFrame) -> Result<i64> {
        let s1 = varint::update_varint(&mut self.buf, frame.count_off, frame.count)?;
        frame.cap_off = frame.cap_off.wrapping_add_signed(s1 as isize);
        frame.region_start = frame.region_start.wrapping_add_signed(s1 as isize);
        frame.write_pos = frame.write_pos.wrapping_add_signed(s1 as isize);

        let s2 = varint::update_varint(&mut self.buf, frame.cap_off, frame.cap)?;
        frame.region_start = frame.region_start.wrapping_add_signed(s2 as isize);
        frame.write_pos = frame.write_pos.wrapping_add_signed(s2 as isize);
        Ok(s1 + s2)
    }

    // ── Property inserts (object context) ──────────────────────────

    fn push_prop(&mut self, prop_key: &str, value_bytes: &[u8]) -> Result<()> {
        {
            let top = self.frames.last().expect("frame stack");
            if top.kind != FrameKind::Object {
                return Err(RecordError::InvalidState("keyed inserts need an object frame"));
            }
        }
        let mut tmp = MemBuf::new();
        scalars::write_string_payload(&mut tmp, prop_key)?;
        tmp.write(value_bytes)?;
        self.append(tmp.as_slice())?;
        self.top().count += 1;
        Ok(())
    }

    pub fn prop_null(&mut self, prop_key: &str) -> Result<()> {
        self.push_prop(prop_key, &[Marker::Null.as_u8()])
    }

    pub fn prop_bool(&mut self, prop_key: &str, value: bool) -> Result<()> {
        let m = if value { Marker::True } else { Marker::False };
        self.push_prop(prop_key, &[m.as_u8()])
    }

    pub fn prop_unsigned(&mut self, prop_key: &str, value: u64) -> Result<()> {
        let marker = scalars::unsigned_marker(value);
        let mut e = [0u8; 9];
        e[0] = marker.as_u8();
        let w = scalars::encode_unsigned(value, marker, &mut e[1..])?;
        self.push_prop(prop_key, &e[..1 + w])
    }

    pub fn prop_signed(&mut self, prop_key: &str, value: i64) -> Result<()> {
        let marker = scalars::signed_marker(value);
        let mut e = [0u8; 9];
        e[0] = marker.as_u8();
        let w = scalars::encode_signed(value, marker, &mut e[1..])?;
        self.push_prop(prop_key, &e[..1 + w])
    }

    pub fn prop_float(&mut self, prop_key: &str, value: f32) -> Result<()> {
        let mut e = [Marker::Float.as_u8(), 0, 0, 0, 0];
        e[1..].copy_from_slice(&value.to_le_bytes());
        self.push_prop(prop_key, &e)
    }

    pub fn prop_string(&mut self, prop_key: &str, value: &str) -> Result<()> {
        let mut tmp = MemBuf::new();
        tmp.write_byte(Marker::String.as_u8())?;
        scalars::write_string_payload(&mut tmp, value)?;
        self.push_prop(prop_key, &tmp.into_vec())
    }

    pub fn prop_binary(&mut self, prop_key: &str, bytes: &[u8], mime: &str) -> Result<()> {
        let mut tmp = MemBuf::new();
        tmp.write_byte(Marker::Binary.as_u8())?;
        scalars::write_binary_payload(&mut tmp, bytes, mime)?;
        self.push_prop(prop_key, &tmp.into_vec())
    }

    pub fn prop_user_binary(&mut self, prop_key: &str, bytes: &[u8], tag: &str) -> Result<()> {
        let mut tmp = MemBuf::new();
        tmp.write_byte(Marker::UserBinary.as_u8())?;
        scalars::write_user_binary_payload(&mut tmp, bytes, tag)?;
        self.push_prop(prop_key, &tmp.into_vec())
    }

    /// Open a nested array as a property value.
    pub fn prop_begin_array(&mut self, prop_key: &str, cap_hint: u64) -> Result<()> {
        self.prop_begin_derived(prop_key, Marker::ArrayBegin, cap_hint)
    }

    /// Open a nested object as a property value.
    pub fn prop_begin_object(&mut self, prop_key: &str, cap_hint: u64) -> Result<()> {
        self.prop_begin_derived(prop_key, Marker::ObjectBegin, cap_hint)
    }

    /// Open a nested container as a property value with an explicit
    /// (possibly derived) begin marker.
    pub fn prop_begin_derived(&mut self, prop_key: &str, marker: Marker, cap_hint: u64) -> Result<()> {
        if !marker.is_array_begin() && !marker.is_object_begin() {
            return Err(RecordError::TypeMismatch {
                expected: "array or object marker",
                found: marker.type_name(),
            });
        }
        {
            let top = self.frames.last().expect("frame stack");
            if top.kind != FrameKind::Object {
                return Err(RecordError::InvalidState("keyed inserts need an object frame"));
            }
        }
        let kind = if marker.is_array_begin() { FrameKind::Array } else { FrameKind::Object };
        self.begin_container(marker, kind, cap_hint, Some(prop_key))
    }

    /// Open a nested column as a property value.
    pub fn prop_begin_column(&mut self, prop_key: &str, kind: ColumnKind, cap_hint: u64) -> Result<()> {
        {
            let top = self.frames.last().expect("frame stack");
            if top.kind != FrameKind::Object {
                return Err(RecordError::InvalidState("keyed inserts need an object frame"));
            }
        }
        self.begin_container(kind.marker(), FrameKind::Column(kind), cap_hint, Some(prop_key))
    }

    // ── Column value inserts ───────────────────────────────────────

    fn column_kind(&self) -> Result<ColumnKind> {
        match self.frames.last().expect("frame stack").kind {
            FrameKind::Column(k) => Ok(k),
            _ => Err(RecordError::InvalidState("column values need a column frame")),
        }
    }

    fn push_slot(&mut self, slot: &[u8]) -> Result<()> {
        self.append(slot)?;
        self.top().count += 1;
        Ok(())
    }

    /// Append the column's null sentinel.
    pub fn col_push_null(&mut self) -> Result<()> {
        let kind = self.column_kind()?;
        let mut slot = [0u8; 8];
        kind.write_null_sentinel(&mut slot);
        let w = kind.width();
        self.push_slot(&slot[..w])
    }

    /// Append an unsigned value; the column must be an unsigned kind wide
    /// enough for the value.
    pub fn col_push_unsigned(&mut self, value: u64) -> Result<()> {
        let kind = self.column_kind()?;
        if !kind.is_unsigned() {
            return Err(RecordError::TypeMismatch {
                expected: "unsigned column",
                found: kind.marker().type_name(),
            });
        }
        let w = kind.width();
        if w < 8 && value >= 1u64 << (8 * w) {
            return Err(RecordError::TypeMismatch {
                expected: "value within column width",
                found: "wider value",
            });
        }
        let slot = value.to_le_bytes();
        self.push_slot(&slot[..w])
    }

    /// Append a signed value; the column must be a signed kind wide enough
    /// for the value.
    pub fn col_push_signed(&mut self, value: i64) -> Result<()> {
        let kind = self.column_kind()?;
        if !kind.is_signed() {
            return Err(RecordError::TypeMismatch {
                expected: "signed column",
                found: kind.marker().type_name(),
            });
        }
        let w = kind.width();
        let fits = match w {
            1 => i8::try_from(value).is_ok(),
            2 => i16::try_from(value).is_ok(),
            4 => i32::try_from(value).is_ok(),
            _ => true,
        };
        if !fits {
            return Err(RecordError::TypeMismatch {
                expected: "value within column width",
                found: "wider value",
            });
        }
        let slot = value.to_le_bytes();
        self.push_slot(&slot[..w])
    }

    /// Append a float value to a float column.
    pub fn col_push_float(&mut self, value: f32) -> Result<()> {
        let kind = self.column_kind()?;
        if kind != ColumnKind::Float {
            return Err(RecordError::TypeMismatch {
                expected: "float column",
                found: kind.marker().type_name(),
            });
        }
        self.push_slot(&value.to_le_bytes())
    }

    /// Append a boolean value to a boolean column.
    pub fn col_push_bool(&mut self, value: bool) -> Result<()> {
        let kind = self.column_kind()?;
        if kind != ColumnKind::Bool {
            return Err(RecordError::TypeMismatch {
                expected: "boolean column",
                found: kind.marker().type_name(),
            });
        }
        self.push_slot(&[if value { BOOL_TRUE } else { BOOL_FALSE }])
    }

    // ── Finish ─────────────────────────────────────────────────────

    /// Close any still-open nested frames, back-patch the root framing,
    /// compute the commit hash, and produce the finished record.
    pub fn finish(mut self) -> Result<Record> {
        while self.frames.len() > 1 {
            self.end()?;
        }
        let mut root = self.frames.pop().expect("root frame");
        if root.kind != FrameKind::Root {
            return Err(RecordError::InvalidState("fragment inserter cannot finish a record"));
        }
        self.patch_frame_varints(&mut root)?;
        key::commit_hash_update(&mut self.buf)?;
        Ok(Record::from_membuf(self.buf))
    }

    /// Finish a fragment, yielding the encoded element bytes.
    pub(crate) fn finish_fragment(mut self) -> Result<Vec<u8>> {
        while self.frames.len() > 1 {
            self.end()?;
        }
        let root = self.frames.pop().expect("fragment frame");
        if root.kind != FrameKind::Fragment {
            return Err(RecordError::InvalidState("record inserter cannot finish a fragment"));
        }
        Ok(self.buf.into_vec())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
