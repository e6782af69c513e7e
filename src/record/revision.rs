//! Revision controller: exclusive edit sessions over a record copy.
//!
//! A revision duplicates the base buffer, takes the edit engine through
//! the `Open` → `Editing` → `Committed` lifecycle, and publishes a freshly
//! computed commit hash at the end. The base record is never touched;
//! failed revisions are simply dropped. Reader/writer exclusion across
//! clones of the same record is the caller's concern, as is keeping a
//! single `Editing` session per record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RecordError, Result};
use crate::record::edit::{self, NewValue};
use crate::record::key;
use crate::record::marker::Marker;
use crate::record::path::DotPath;
use crate::record::scalars;
use crate::record::Record;

// ── Lifecycle ──────────────────────────────────────────────────────

/// Lifecycle of a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionState {
    /// Buffer duplicated, editing not yet begun.
    Open,
    /// Mutations allowed.
    Editing,
    /// Hash published; the revision has been consumed.
    Committed,
}

impl RevisionState {
    fn name(self) -> &'static str {
        match self {
            RevisionState::Open => "Open",
            RevisionState::Editing => "Editing",
            RevisionState::Committed => "Committed",
        }
    }
}

/// Summary of a committed revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseReport {
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub commit_hash: u64,
}

// ── Revision ───────────────────────────────────────────────────────

/// An edit session over a private copy of a record.
#[derive(Debug)]
pub struct Revision {
    record: Record,
    state: RevisionState,
    fault: Option<RecordError>,
    inserts: u64,
    updates: u64,
    removes: u64,
    bytes_before: u64,
}

impl Revision {
    /// Duplicate `base` into a new revision in the `Open` state.
    pub fn open(base: &Record) -> Self {
        Self {
            bytes_before: base.len() as u64,
            record: base.clone(),
            state: RevisionState::Open,
            fault: None,
            inserts: 0,
            updates: 0,
            removes: 0,
        }
    }

    /// Duplicate `base` and move straight to `Editing`.
    pub fn begin(base: &Record) -> Result<Self> {
        let mut rev = Self::open(base);
        rev.begin_edit()?;
        Ok(rev)
    }

    /// Move `Open` → `Editing`.
    pub fn begin_edit(&mut self) -> Result<()> {
        if self.state != RevisionState::Open {
            return Err(RecordError::InvalidState(self.state.name()));
        }
        self.state = RevisionState::Editing;
        Ok(())
    }

    pub fn state(&self) -> RevisionState {
        self.state
    }

    /// The working copy (reflects edits applied so far; its commit hash is
    /// stale until `end`).
    pub fn record(&self) -> &Record {
        &self.record
    }

    fn guard(&self) -> Result<()> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        if self.state != RevisionState::Editing {
            return Err(RecordError::InvalidState(self.state.name()));
        }
        Ok(())
    }

    fn run<T>(&mut self, op: impl FnOnce(&mut Record) -> Result<T>) -> Result<T> {
        self.guard()?;
        match op(&mut self.record) {
            Ok(v) => Ok(v),
            Err(e) => {
                // A record-invalidating error poisons the whole session.
                if e.is_fatal() {
                    self.fault = Some(e.clone());
                }
                Err(e)
            }
        }
    }

    fn update(&mut self, dot_path: &DotPath, value: NewValue<'_>) -> Result<()> {
        self.run(|rec| {
            let root = rec.payload_offset()?;
            edit::update_field(rec.membuf_mut(), root, dot_path, value)
        })?;
        self.updates += 1;
        Ok(())
    }

    // ── Typed setters ──────────────────────────────────────────────

    pub fn set_null(&mut self, p: &DotPath) -> Result<()> {
        self.update(p, NewValue::Null)
    }

    pub fn set_bool(&mut self, p: &DotPath, v: bool) -> Result<()> {
        self.update(p, NewValue::Bool(v))
    }

    pub fn set_u8(&mut self, p: &DotPath, v: u8) -> Result<()> {
        self.update(p, NewValue::U8(v))
    }

    pub fn set_u16(&mut self, p: &DotPath, v: u16) -> Result<()> {
        self.update(p, NewValue::U16(v))
    }

    pub fn set_u32(&mut self, p: &DotPath, v: u32) -> Result<()> {
        self.update(p, NewValue::U32(v))
    }

    pub fn set_u64(&mut self, p: &DotPath, v: u64) -> Result<()> {
        self.update(p, NewValue::U64(v))
    }

    pub fn set_i8(&mut self, p: &DotPath, v: i8) -> Result<()> {
        self.update(p, NewValue::I8(v))
    }

    pub fn set_i16(&mut self, p: &DotPath, v: i16) -> Result<()> {
        self.update(p, NewValue::I16(v))
    }

    pub fn set_i32(&mut self, p: &DotPath, v: i32) -> Result<()> {
        self.update(p, NewValue::I32(v))
    }

    pub fn set_i64(&mut self, p: &DotPath, v: i64) -> Result<()> {
        self.update(p, NewValue::I64(v))
    }

    pub fn set_float(&mut self, p: &DotPath, v: f32) -> Result<()> {
        self.update(p, NewValue::Float(v))
    }

    /// Set an unsigned integer at the smallest fitting width.
    pub fn set_unsigned(&mut self, p: &DotPath, v: u64) -> Result<()> {
        match scalars::unsigned_marker(v) {
            Marker::U8 => self.set_u8(p, v as u8),
            Marker::U16 => self.set_u16(p, v as u16),
            Marker::U32 => self.set_u32(p, v as u32),
            _ => self.set_u64(p, v),
        }
    }

    /// Set a signed integer at the smallest fitting width.
    pub fn set_signed(&mut self, p: &DotPath, v: i64) -> Result<()> {
        match scalars::signed_marker(v) {
            Marker::I8 => self.set_i8(p, v as i8),
            Marker::I16 => self.set_i16(p, v as i16),
            Marker::I32 => self.set_i32(p, v as i32),
            _ => self.set_i64(p, v),
        }
    }

    pub fn set_string(&mut self, p: &DotPath, v: &str) -> Result<()> {
        self.update(p, NewValue::Str(v))
    }

    pub fn set_binary(&mut self, p: &DotPath, bytes: &[u8], mime: &str) -> Result<()> {
        self.update(p, NewValue::Binary { bytes, mime })
    }

    pub fn set_user_binary(&mut self, p: &DotPath, bytes: &[u8], tag: &str) -> Result<()> {
        self.update(p, NewValue::UserBinary { bytes, tag })
    }

    /// Replace the target with an arbitrary JSON subtree.
    pub fn set_json(&mut self, p: &DotPath, v: &Value) -> Result<()> {
        self.update(p, NewValue::Json(v))
    }

    // ── Structural edits ───────────────────────────────────────────

    /// Insert a JSON value at `index` of the container at `parent`
    /// (`None` = the root array).
    pub fn insert_element(&mut self, parent: Option<&DotPath>, index: u64, v: &Value) -> Result<()> {
        self.run(|rec| {
            let root = rec.payload_offset()?;
            edit::insert_element_at(rec.membuf_mut(), root, parent, index, NewValue::Json(v))
        })?;
        self.inserts += 1;
        Ok(())
    }

    /// Insert a property at `index` of the object at `object_path`.
    pub fn insert_prop(
        &mut self,
        object_path: &DotPath,
        index: u64,
        prop_key: &str,
        v: &Value,
    ) -> Result<()> {
        self.run(|rec| {
            let root = rec.payload_offset()?;
            edit::insert_prop_at(rec.membuf_mut(), root, Some(object_path), index, prop_key, v)
        })?;
        self.inserts += 1;
        Ok(())
    }

    /// Remove the field at `path` (column slots become nulls).
    pub fn remove(&mut self, p: &DotPath) -> Result<()> {
        self.run(|rec| {
            let root = rec.payload_offset()?;
            edit::remove_field(rec.membuf_mut(), root, p)
        })?;
        self.removes += 1;
        Ok(())
    }

    /// Rewrite the record's string key in place (the only key mutation).
    pub fn set_string_key(&mut self, new_key: &str) -> Result<()> {
        self.run(|rec| key::update_string_key(rec.membuf_mut(), new_key).map(|_| ()))?;
        self.updates += 1;
        Ok(())
    }

    /// Trim every container region to its live size and release excess
    /// buffer capacity.
    pub fn optimize(&mut self) -> Result<()> {
        let before = self.record.len();
        self.run(|rec| {
            let root = rec.payload_offset()?;
            edit::compact(rec.membuf_mut(), root)?;
            rec.membuf_mut().shrink_to_fit();
            Ok(())
        })?;
        tracing::debug!(
            bytes_before = before,
            bytes_after = self.record.len(),
            "revision optimize"
        );
        Ok(())
    }

    // ── Commit ─────────────────────────────────────────────────────

    /// Recompute the commit hash over the edited payload, publish it, and
    /// return the finished record with a summary. The hash is only
    /// published here; a dropped revision leaves no trace.
    pub fn end(mut self) -> Result<(Record, ReviseReport)> {
        self.guard()?;
        let commit_hash = key::commit_hash_update(self.record.membuf_mut())?;
        self.state = RevisionState::Committed;
        let report = ReviseReport {
            inserts: self.inserts,
            updates: self.updates,
            removes: self.removes,
            bytes_before: self.bytes_before,
            bytes_after: self.record.len() as u64,
            commit_hash,
        };
        tracing::debug!(
            inserts = report.inserts,
            updates = report.updates,
            removes = report.removes,
            commit_hash = format_args!("{:016x}", commit_hash),
            "revision committed"
        );
        Ok((self.record, report))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
