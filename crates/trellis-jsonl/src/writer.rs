//! JSONL writing.
//!
//! [`JsonlWriter`] serializes values onto single lines through a buffer.
//! [`append_jsonl`] is the append-only entry point: it never truncates, so
//! records already on disk are left untouched.

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Async writer for JSONL data.
///
/// Nothing reaches the underlying writer until the buffer fills or
/// [`flush`](Self::flush) is called.
pub struct JsonlWriter<W> {
    writer: BufWriter<W>,
    lines_written: usize,
}

impl<W: AsyncWrite + Unpin> JsonlWriter<W> {
    /// Wraps `writer` in a buffered JSONL writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            lines_written: 0,
        }
    }

    /// Serializes `value` as one line.
    ///
    /// The value is encoded in full before anything is buffered, so an
    /// encoding failure never leaves a partial line behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the value cannot be serialized, or
    /// [`Error::Io`] if the write fails.
    pub async fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value).map_err(Error::encode)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.lines_written += 1;
        Ok(())
    }

    /// Serializes every value in `values`, one per line.
    ///
    /// # Errors
    ///
    /// Stops at the first value that fails to serialize or write.
    pub async fn write_all<'a, T, I>(&mut self, values: I) -> Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for value in values {
            self.write(value).await?;
        }
        Ok(())
    }

    /// Flushes buffered lines to the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the flush fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Number of lines accepted by this writer so far.
    #[must_use]
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// Consumes the writer, returning the buffered writer without flushing.
    #[must_use]
    pub fn into_inner(self) -> BufWriter<W> {
        self.writer
    }
}

/// Appends `values` to the JSONL file at `path`, creating it if needed.
///
/// Every value is encoded before the file is touched, so a serialization
/// failure appends nothing. The data is flushed and synced before returning.
/// An empty slice is a no-op and does not create the file.
///
/// # Errors
///
/// Returns [`Error::Json`] if a value cannot be serialized, or [`Error::Io`]
/// if the file cannot be opened, written or synced.
pub async fn append_jsonl<T, P>(path: P, values: &[T]) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    if values.is_empty() {
        return Ok(());
    }

    let mut payload = Vec::new();
    for value in values {
        serde_json::to_writer(&mut payload, value).map_err(Error::encode)?;
        payload.push(b'\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .await?;
    file.write_all(&payload).await?;
    file.flush().await?;
    file.sync_data().await?;

    tracing::trace!(path = %path.as_ref().display(), count = values.len(), "Appended JSONL records");
    Ok(())
}
