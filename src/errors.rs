// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by the extraction, embedding and retrieval layers.
//!
//! Recoverable conditions (`Parse`, `EncoderUnavailable`) are usually collected
//! next to partial output by the pipeline; the rest abort the operation that
//! raised them without leaving partial state behind.

use std::path::PathBuf;

/// Errors produced by the fnseek library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source file could not be parsed; the file is skipped.
    #[error("parse error in {path}: {reason}")]
    Parse { path: String, reason: String },

    /// No grammar is registered for the file.
    #[error("unsupported language for {0}")]
    UnsupportedLanguage(String),

    /// A vector does not match the dimension of the collection.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vectors produced by different encoder configurations were mixed.
    #[error("encoder mismatch: collection uses '{expected}', got '{actual}'")]
    EncoderMismatch { expected: String, actual: String },

    /// An empty vector was appended to a collection with no dimension yet.
    #[error("cannot append an empty vector")]
    EmptyVector,

    /// A vector contained NaN or infinite components.
    #[error("vector contains non-finite values")]
    NonFiniteVector,

    /// The embedding capability failed for the listed inputs.
    #[error("encoder unavailable for {} input(s): {reason}", inputs.len())]
    EncoderUnavailable { inputs: Vec<usize>, reason: String },

    /// A query violated the search contract.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A persisted index is internally inconsistent.
    #[error("index consistency error: {0}")]
    IndexConsistency(String),

    /// The operation was cancelled between work items.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// A stored unit record could not be decoded.
    #[error("invalid unit record at {location}: {reason}")]
    InvalidRecord { location: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding cache error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the enclosing batch may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. } | Error::UnsupportedLanguage(_) | Error::EncoderUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_displays_both_sizes() {
        let err = Error::DimensionMismatch {
            expected: 8,
            actual: 10,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 8, got 10");
    }

    #[test]
    fn encoder_unavailable_counts_inputs() {
        let err = Error::EncoderUnavailable {
            inputs: vec![3, 4, 5],
            reason: "timeout".into(),
        };
        assert!(err.to_string().contains("3 input(s)"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn io_error_shows_path() {
        let err = Error::io(
            "/tmp/missing.npy",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.npy"));
        assert!(!err.is_recoverable());
    }
}
