//! Append-only audit log of flag state changes.
//!
//! The engine records an [`AuditEntry`] when a flag is created and when a
//! deactivation applies (one entry for the flag itself plus one per cascaded
//! dependent). Activations are recorded too under
//! [`AuditPolicy::EveryTransition`].
//!
//! Entries are write-once. They are read back per flag, newest first, one
//! page at a time.
//!
//! Backends:
//!
//! - **In-memory** ([`MemoryAuditSink`]): entries held in a `RwLock<Vec<_>>`
//! - **JSONL** ([`JsonlAuditSink`]): one JSON object per line in an
//!   append-only file

use crate::domain::FlagId;
use crate::error::AuditError;
use crate::pagination::{Page, PageRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

mod jsonl;
mod memory;

pub use jsonl::JsonlAuditSink;
pub use memory::MemoryAuditSink;

/// Result type for audit operations.
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Message recorded for each dependent switched off by a cascade.
pub const CASCADE_MESSAGE: &str = "flag auto-disabled due to dependency deactivation";

/// Message recorded when a flag is created.
pub const CREATED_MESSAGE: &str = "flag created";

/// Message recorded for a user-requested deactivation.
pub const DEACTIVATED_MESSAGE: &str = "flag deactivated";

/// Message recorded for a user-requested activation.
pub const ACTIVATED_MESSAGE: &str = "flag activated";

/// Well-known metadata keys.
pub mod keys {
    /// Subject flag of the entry.
    pub const FLAG_ID: &str = "flag_id";
    /// Flag whose deactivation caused a cascade.
    pub const TRIGGERED_BY: &str = "triggered_by";
    /// Caller-supplied reason.
    pub const REASON: &str = "reason";
    /// Resulting active state.
    pub const ACTIVE: &str = "active";
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Human-readable description.
    pub message: String,

    /// When the event happened.
    pub timestamp: DateTime<Utc>,

    /// Open key/value bag; see [`keys`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl AuditEntry {
    /// Entry with the given message, stamped now, about `flag_id`.
    pub fn new(message: impl Into<String>, flag_id: FlagId) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
        .with(keys::FLAG_ID, flag_id.get())
    }

    /// Add a metadata key.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Override the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Flag creation.
    #[must_use]
    pub fn created(flag_id: FlagId, active: bool) -> Self {
        Self::new(CREATED_MESSAGE, flag_id).with(keys::ACTIVE, active)
    }

    /// User-requested state change with its reason.
    #[must_use]
    pub fn toggled(flag_id: FlagId, active: bool, reason: &str) -> Self {
        let message = if active {
            ACTIVATED_MESSAGE
        } else {
            DEACTIVATED_MESSAGE
        };
        Self::new(message, flag_id)
            .with(keys::ACTIVE, active)
            .with(keys::REASON, reason)
    }

    /// Dependent switched off because `triggered_by` was deactivated.
    #[must_use]
    pub fn cascaded(dependent: FlagId, triggered_by: FlagId) -> Self {
        Self::new(CASCADE_MESSAGE, dependent)
            .with(keys::TRIGGERED_BY, triggered_by.get())
            .with(keys::ACTIVE, false)
    }

    /// Read a flag id stored under `key`.
    #[must_use]
    pub fn flag_ref(&self, key: &str) -> Option<FlagId> {
        self.metadata.get(key).and_then(Value::as_u64).map(FlagId)
    }

    /// Whether this entry concerns `id`, as subject or as trigger.
    #[must_use]
    pub fn concerns(&self, id: FlagId) -> bool {
        self.flag_ref(keys::FLAG_ID) == Some(id) || self.flag_ref(keys::TRIGGERED_BY) == Some(id)
    }
}

/// Which transitions produce audit entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditPolicy {
    /// Creation, deactivation and cascades only.
    #[default]
    CreationAndDeactivation,

    /// Additionally record plain activations.
    EveryTransition,
}

impl AuditPolicy {
    /// Whether activations are recorded.
    #[must_use]
    pub fn records_activation(self) -> bool {
        matches!(self, Self::EveryTransition)
    }
}

/// Durable, queryable audit log.
///
/// Implementations must be `Send + Sync`.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one entry.
    async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        self.append_batch(vec![entry]).await
    }

    /// Append several entries in one round trip. Empty input is a no-op.
    async fn append_batch(&self, entries: Vec<AuditEntry>) -> AuditResult<()>;

    /// Entries concerning `flag_id`, newest first.
    async fn query_by_flag(
        &self,
        flag_id: FlagId,
        page: PageRequest,
    ) -> AuditResult<Page<AuditEntry>>;
}

/// Select and order the entries concerning `flag_id`, then cut one page.
///
/// `entries` must be in append order. Equal timestamps keep the later append
/// first.
pub(crate) fn page_for_flag(
    entries: &[AuditEntry],
    flag_id: FlagId,
    page: PageRequest,
) -> Page<AuditEntry> {
    let mut matching: Vec<AuditEntry> = entries
        .iter()
        .rev()
        .filter(|entry| entry.concerns(flag_id))
        .cloned()
        .collect();
    // Stable sort keeps reverse append order among equal timestamps.
    matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    page.slice(matching)
}

/// Audit backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditBackend {
    /// Ephemeral in-process log.
    InMemory,

    /// Append-only JSONL file.
    Jsonl(PathBuf),
}

/// Create an audit sink for the given backend.
///
/// # Errors
///
/// Returns `AuditError::Io` or `AuditError::Jsonl` if an existing JSONL file
/// cannot be read.
pub async fn create_audit_sink(backend: AuditBackend) -> AuditResult<Arc<dyn AuditSink>> {
    match backend {
        AuditBackend::InMemory => Ok(Arc::new(MemoryAuditSink::new())),
        AuditBackend::Jsonl(path) => Ok(Arc::new(JsonlAuditSink::open(path).await?)),
    }
}

// ========== Test Utilities ==========

/// A sink whose every call fails with [`AuditError::Backend`].
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingAuditSink;

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn append_batch(&self, _entries: Vec<AuditEntry>) -> AuditResult<()> {
        Err(AuditError::Backend("audit sink unavailable".to_string()))
    }

    async fn query_by_flag(
        &self,
        _flag_id: FlagId,
        _page: PageRequest,
    ) -> AuditResult<Page<AuditEntry>> {
        Err(AuditError::Backend("audit sink unavailable".to_string()))
    }
}
