//! Audit sink backed by an append-only JSONL file.
//!
//! Existing entries are loaded once at open; lines that fail to decode are
//! logged and skipped rather than failing startup. Appends go to disk first
//! and join the in-memory index only after the write succeeded.

use super::{AuditEntry, AuditResult, AuditSink, page_for_flag};
use crate::domain::FlagId;
use crate::pagination::{Page, PageRequest};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use trellis_jsonl::{append_jsonl, read_jsonl_resilient};

/// File-backed audit log.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    /// Every entry in file order; the lock also serializes appends.
    entries: Mutex<Vec<AuditEntry>>,
}

impl JsonlAuditSink {
    /// Open the log at `path`, loading any entries already there.
    ///
    /// A missing file is fine; it is created by the first append.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, or if the
    /// parent directory cannot be created.
    pub async fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match read_jsonl_resilient::<AuditEntry, _>(&path).await {
            Ok((entries, warnings)) => {
                for warning in &warnings {
                    tracing::warn!(
                        path = %path.display(),
                        line = warning.line_number(),
                        kind = warning.kind(),
                        "Skipping unreadable audit entry: {warning}"
                    );
                }
                entries
            }
            Err(trellis_jsonl::Error::Io(e)) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened JSONL audit log");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append_batch(&self, entries: Vec<AuditEntry>) -> AuditResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cached = self.entries.lock().await;
        append_jsonl(&self.path, &entries).await?;
        cached.extend(entries);
        Ok(())
    }

    async fn query_by_flag(
        &self,
        flag_id: FlagId,
        page: PageRequest,
    ) -> AuditResult<Page<AuditEntry>> {
        let entries = self.entries.lock().await;
        Ok(page_for_flag(&entries, flag_id, page))
    }
}
