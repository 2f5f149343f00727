//! JSON Lines codec for append-only logs.
//!
//! Each record is one JSON value on its own line. The crate offers a buffered
//! async writer, an append helper that creates the target file on demand, and
//! a reader that either fails fast on malformed input or skips it while
//! collecting [`Warning`]s.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod reader;
pub mod warning;
pub mod writer;

pub use error::{Error, Result};
pub use reader::{JsonlReader, read_jsonl_resilient};
pub use warning::{Warning, WarningCollector};
pub use writer::{JsonlWriter, append_jsonl};
