//! Error types for the record engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecordError>;

/// Closed error set of the record layer.
///
/// Two tiers: local-recoverable errors (`NotFound`, `NotResolvable`,
/// `TypeMismatch`) leave the record untouched and may be retried with
/// different arguments. Record-invalidating errors (`Corrupted`, `Internal`)
/// mean the buffer can no longer be trusted; mutators must not be retried
/// on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Read past end of buffer at offset {0}")]
    OutOfBounds(usize),

    #[error("Buffer growth to {0} bytes exceeds the maximum record size")]
    Capacity(usize),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },

    #[error("Field not found: {0}")]
    NotFound(String),

    #[error("Path not resolvable: {0}")]
    NotResolvable(String),

    #[error("Operation not allowed in state '{0}'")]
    InvalidState(&'static str),

    #[error("Cursor invalidated: {0}")]
    InvalidCursor(&'static str),

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    #[error("Index does not match the record: {0}")]
    NotIndexed(String),

    #[error("Internal invariant broken: {0}")]
    Internal(String),
}

impl RecordError {
    /// Get the stable error code for embedding layers.
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::OutOfBounds(_) => "OUT_OF_BOUNDS",
            RecordError::Capacity(_) => "CAPACITY",
            RecordError::TypeMismatch { .. } => "TYPE_MISMATCH",
            RecordError::NotFound(_) => "NOT_FOUND",
            RecordError::NotResolvable(_) => "NOT_RESOLVABLE",
            RecordError::InvalidState(_) => "INVALID_STATE",
            RecordError::InvalidCursor(_) => "INVALID_CURSOR",
            RecordError::Corrupted(_) => "CORRUPTED",
            RecordError::NotIndexed(_) => "NOT_INDEXED",
            RecordError::Internal(_) => "INTERNAL",
        }
    }

    /// True if the record must be considered unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecordError::Corrupted(_) | RecordError::Internal(_))
    }
}
