//! JSONL reading.
//!
//! [`JsonlReader`] decodes one value per line and keeps a 1-based line counter
//! for error reporting. Blank lines are ignored. [`read_jsonl_resilient`] is
//! the convenience entry point for loading a whole file while skipping bad
//! records.

use crate::error::{Error, Result};
use crate::warning::{Warning, WarningCollector};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Async reader for JSONL data.
///
/// # Examples
///
/// ```no_run
/// use trellis_jsonl::JsonlReader;
/// use tokio::fs::File;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let file = File::open("audit.jsonl").await?;
/// let mut reader = JsonlReader::new(file);
/// while let Some(value) = reader.read_value::<serde_json::Value>().await? {
///     println!("{value}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct JsonlReader<R> {
    reader: BufReader<R>,
    /// 1-based number of the last line read; 0 before the first read.
    line_number: usize,
    buf: Vec<u8>,
}

/// A raw line pulled from the underlying reader.
enum RawLine {
    Text(String),
    NotUtf8,
}

impl<R: AsyncRead + Unpin> JsonlReader<R> {
    /// Wraps `reader` in a buffered JSONL reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buf: Vec::new(),
        }
    }

    /// Returns the 1-based number of the last line read.
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next non-blank line, or `None` at end of input.
    async fn next_line(&mut self) -> Result<Option<RawLine>> {
        loop {
            self.buf.clear();
            let read = self.reader.read_until(b'\n', &mut self.buf).await?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let Ok(text) = std::str::from_utf8(&self.buf) else {
                return Ok(Some(RawLine::NotUtf8));
            };
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(RawLine::Text(trimmed.to_string())));
        }
    }

    /// Decodes the next record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for a line that does not decode into `T`,
    /// [`Error::InvalidFormat`] for a line that is not UTF-8, and
    /// [`Error::Io`] if the underlying reader fails.
    pub async fn read_value<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.next_line().await? {
            None => Ok(None),
            Some(RawLine::NotUtf8) => Err(Error::InvalidFormat(format!(
                "line {} is not valid UTF-8",
                self.line_number
            ))),
            Some(RawLine::Text(line)) => {
                serde_json::from_str(&line)
                    .map(Some)
                    .map_err(|source| Error::Json {
                        line_number: self.line_number,
                        source,
                    })
            }
        }
    }

    /// Decodes the next record that parses, recording a warning for each line
    /// skipped along the way.
    ///
    /// # Errors
    ///
    /// Only I/O failures are returned; decoding problems become warnings.
    pub async fn read_value_resilient<T: DeserializeOwned>(
        &mut self,
        warnings: &WarningCollector,
    ) -> Result<Option<T>> {
        loop {
            match self.next_line().await? {
                None => return Ok(None),
                Some(RawLine::NotUtf8) => warnings.add(Warning::SkippedLine {
                    line_number: self.line_number,
                    reason: "invalid UTF-8".to_string(),
                }),
                Some(RawLine::Text(line)) => match serde_json::from_str(&line) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => warnings.add(Warning::MalformedJson {
                        line_number: self.line_number,
                        error: e.to_string(),
                    }),
                },
            }
        }
    }
}

/// Reads every decodable record from `path`, skipping malformed lines.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened or read. A missing file
/// is reported as an I/O error of kind `NotFound`.
pub async fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref()).await?;
    let mut reader = JsonlReader::new(file);
    let warnings = WarningCollector::new();
    let mut values = Vec::new();

    while let Some(value) = reader.read_value_resilient(&warnings).await? {
        values.push(value);
    }

    Ok((values, warnings.into_warnings()))
}
