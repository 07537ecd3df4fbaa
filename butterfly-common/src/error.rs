//! Error types shared across the butterfly-osm toolkit
//!
//! Storage and input-validation failures. Algorithm crates wrap these in their
//! own error enums; the CLI turns everything into `anyhow` reports.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for butterfly-common errors
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted store has an unexpected layout (magic, version, sizes)
    #[error("Invalid format in {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    /// A persisted store failed its CRC-64 check
    #[error("Checksum mismatch in {path}: expected 0x{expected:016x}, got 0x{actual:016x}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Invalid configuration or parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed JSON input
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the error means "the store exists but cannot be trusted".
    ///
    /// Corrupted stores are never repaired in place; they must be rebuilt.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat { .. } | Error::ChecksumMismatch { .. }
        )
    }
}
