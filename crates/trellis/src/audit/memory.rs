//! In-memory audit sink.

use super::{AuditEntry, AuditResult, AuditSink, page_for_flag};
use crate::domain::FlagId;
use crate::pagination::{Page, PageRequest};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Audit log held in process memory; lost on exit.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries recorded so far.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of every entry, in append order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append_batch(&self, entries: Vec<AuditEntry>) -> AuditResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn query_by_flag(
        &self,
        flag_id: FlagId,
        page: PageRequest,
    ) -> AuditResult<Page<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(page_for_flag(&entries, flag_id, page))
    }
}
