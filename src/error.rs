//! Error types for SpanKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using SpanKvError
pub type Result<T> = std::result::Result<T, SpanKvError>;

/// Unified error type for SpanKV operations
#[derive(Debug, Error)]
pub enum SpanKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Index capacity exhausted: {capacity} entries")]
    CapacityExhausted { capacity: u64 },

    #[error("Record of {size} bytes does not fit a {page_size} byte page")]
    RecordTooLarge { size: usize, page_size: usize },

    #[error("Log corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Session / Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Session limit reached: {0} sessions")]
    SessionLimit(usize),

    #[error("Store has been disposed")]
    Disposed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SpanKvError {
    /// Whether this error came from turning stored bytes back into a value
    pub fn is_decode(&self) -> bool {
        matches!(self, SpanKvError::Decode(_))
    }
}
