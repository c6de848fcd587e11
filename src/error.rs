// ─── Error ──────────────────────────────────────────────────────────────────
use thiserror::Error;

use crate::types::LayoutCode;

/// Result type alias using RowError.
pub type Result<T> = std::result::Result<T, RowError>;

/// Result kinds reported by row operations.
///
/// Expected runtime conditions (a missing path, reading a field as the wrong
/// type, a duplicate in a unique scope) come back as one of these. Broken
/// caller contracts and corrupted rows panic instead.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("operation failed")]
    Failure,
    #[error("field not found")]
    NotFound,
    #[error("field already exists")]
    Exists,
    #[error("row too large: {size} bytes (max {max})")]
    TooBig { size: usize, max: usize },
    #[error("type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: LayoutCode,
        actual: LayoutCode,
    },
    #[error("scope or cursor is read-only")]
    InsufficientPermissions,
    #[error("value type violates the scope's type constraint")]
    TypeConstraint,
    #[error("invalid row: {0}")]
    InvalidRow(String),
    #[error("buffer too short")]
    InsufficientBuffer,
    #[error("operation canceled")]
    Canceled,
    #[error("invalid config: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
