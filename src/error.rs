//! Error types for the smap semantic map trainer.

use thiserror::Error;

/// The main error type for smap operations.
#[derive(Error, Debug)]
pub enum SmapError {
    /// I/O error while reading or writing a data file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file did not have the expected binary layout.
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid parameter or parameter combination.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// An allocation or counter exceeded its type width.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The host cannot run smap at all.
    #[error("Fatal: {0}")]
    Fatal(String),
}

/// Result type alias for smap operations.
pub type Result<T> = std::result::Result<T, SmapError>;
