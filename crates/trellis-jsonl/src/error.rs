//! Error types for trellis-jsonl operations.

use std::io;
use thiserror::Error;

/// The error type for trellis-jsonl operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred while reading or writing.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A line could not be decoded, or a value could not be encoded.
    ///
    /// `line_number` is 0 for encoding failures, which have no line yet.
    #[error("JSON error at line {line_number}: {source}")]
    Json {
        /// The 1-based line number of the offending record.
        line_number: usize,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid JSONL format.
    #[error("Invalid JSONL format: {0}")]
    InvalidFormat(String),
}

impl Error {
    pub(crate) fn encode(source: serde_json::Error) -> Self {
        Self::Json {
            line_number: 0,
            source,
        }
    }
}

/// A specialized Result type for trellis-jsonl operations.
pub type Result<T> = std::result::Result<T, Error>;
