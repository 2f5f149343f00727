//! Non-fatal problems found while reading JSONL data.
//!
//! Resilient reads keep going past bad lines and hand back a list of
//! [`Warning`]s instead of failing. [`WarningCollector`] accumulates them and
//! can be cloned into whatever context performs the reading.
//!
//! ```
//! use trellis_jsonl::warning::{Warning, WarningCollector};
//!
//! let collector = WarningCollector::new();
//! collector.add(Warning::MalformedJson {
//!     line_number: 3,
//!     error: "expected value".to_string(),
//! });
//! assert_eq!(collector.into_warnings().len(), 1);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

/// A non-fatal warning raised while reading JSONL data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The line is not valid JSON, or does not decode into the requested type.
    MalformedJson {
        /// The 1-based line number.
        line_number: usize,
        /// The decoder's message.
        error: String,
    },

    /// The line was dropped before decoding was attempted.
    SkippedLine {
        /// The 1-based line number.
        line_number: usize,
        /// Why the line was dropped.
        reason: String,
    },
}

impl Warning {
    /// Returns the line number the warning refers to.
    #[must_use]
    pub fn line_number(&self) -> usize {
        match self {
            Self::MalformedJson { line_number, .. } | Self::SkippedLine { line_number, .. } => {
                *line_number
            }
        }
    }

    /// Returns a short machine-friendly identifier for the warning kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedJson { .. } => "malformed_json",
            Self::SkippedLine { .. } => "skipped_line",
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedJson { line_number, error } => {
                write!(f, "line {line_number}: malformed JSON: {error}")
            }
            Self::SkippedLine {
                line_number,
                reason,
            } => write!(f, "line {line_number}: skipped: {reason}"),
        }
    }
}

impl std::error::Error for Warning {}

/// Shared, cloneable accumulator of [`Warning`]s.
///
/// Every clone appends to the same list.
#[derive(Debug, Clone, Default)]
pub struct WarningCollector {
    warnings: Arc<Mutex<Vec<Warning>>>,
}

impl WarningCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn add(&self, warning: Warning) {
        tracing::trace!(kind = warning.kind(), line = warning.line_number(), "JSONL warning");
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    /// Returns the number of warnings recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the collector and returns the recorded warnings in order.
    ///
    /// A lock poisoned by a panicking writer still yields what was recorded.
    #[must_use]
    pub fn into_warnings(self) -> Vec<Warning> {
        match Arc::try_unwrap(self.warnings) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
