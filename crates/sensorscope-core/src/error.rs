//! Error type shared by the model, plot and recorder layers.

use crate::value::ValueKind;

/// Errors raised by model operations.
///
/// Missing plot data and history eviction have no variant here; both are
/// ordinary states.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A [`Value`](crate::Value) was read through an accessor for another tag.
    #[error("value is {actual}, not {expected}")]
    TypeMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },

    /// An empty path (or a path with an empty segment) reached the tree.
    #[error("malformed sensor path: {reason}")]
    MalformedPath { reason: &'static str },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Stable short code, used in status lines and log records.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::MalformedPath { .. } => "malformed_path",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
