//! Error types for runstore
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for runstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// A file-system operation on a specific file failed
    #[error("failed to {op} {}: {source}", path.display())]
    File {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Read/Write Validation Errors
    // -------------------------------------------------------------------------
    #[error("Size mismatch: expected {expected} values, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Invalid range: [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },

    #[error("Index {index} out of bounds (len {len})")]
    OutOfBounds { index: u64, len: u64 },

    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Metadata corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Wrap an I/O error with the operation and file it happened on
    pub fn file(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::File {
            op,
            path: path.into(),
            source,
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Attach file context to `io::Result`s inside the storage layers
pub(crate) trait IoContext<T> {
    fn with_file(self, op: &'static str, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_file(self, op: &'static str, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| StoreError::file(op, path, e))
    }
}
