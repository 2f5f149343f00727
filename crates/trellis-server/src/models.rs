//! Request and response bodies.
//!
//! These wrap trellis domain types for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use trellis::audit::AuditEntry;
use trellis::domain::{FlagDetails, FlagId, NewFlag};
use trellis::pagination::Page;

/// Body of `POST /api/v1/flags`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFlagRequest {
    /// Unique flag name.
    pub name: String,

    /// Requested initial state.
    #[serde(default)]
    pub active: bool,

    /// Ids of the flags this one depends on.
    #[serde(default, alias = "feature_flag_id_dependencies")]
    pub dependency_ids: Vec<FlagId>,
}

impl From<CreateFlagRequest> for NewFlag {
    fn from(req: CreateFlagRequest) -> Self {
        NewFlag::new(req.name, req.active, req.dependency_ids)
    }
}

/// Body of `PATCH /api/v1/flags/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFlagRequest {
    /// Requested state.
    pub active: bool,

    /// Why the state is changing.
    pub reason: String,
}

/// Query string of `GET /api/v1/flags/{id}/logs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    /// 1-based page number.
    pub page: Option<u32>,

    /// Entries per page.
    pub size: Option<u32>,
}

/// Successful response envelope.
#[derive(Debug, Serialize)]
pub struct SuccessBody<T> {
    /// Summary of what happened.
    pub message: String,

    /// Payload, omitted when there is none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> SuccessBody<T> {
    /// Envelope with a payload.
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// A flag as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct FlagResponse {
    /// Flag id.
    pub id: FlagId,

    /// Flag name.
    pub name: String,

    /// Current state.
    pub active: bool,

    /// Ids of direct dependencies.
    pub dependencies: Vec<FlagId>,

    /// Ids of direct dependents.
    pub dependents: Vec<FlagId>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl From<FlagDetails> for FlagResponse {
    fn from(details: FlagDetails) -> Self {
        Self {
            id: details.id,
            name: details.name,
            active: details.active,
            dependencies: details.dependency_ids,
            dependents: details.dependent_ids,
            created_at: details.created_at,
            updated_at: details.updated_at,
        }
    }
}

/// Result of a state change.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleResponse {
    /// Flag id.
    pub id: FlagId,

    /// State after the request.
    pub active: bool,

    /// Dependents switched off along with the flag.
    pub cascaded: Vec<FlagId>,

    /// Whether the audit entries were written.
    pub audit: String,
}

/// One audit entry as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntryResponse {
    /// Description.
    pub message: String,

    /// When it happened.
    pub timestamp: DateTime<Utc>,

    /// Extra details.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl From<AuditEntry> for LogEntryResponse {
    fn from(entry: AuditEntry) -> Self {
        Self {
            message: entry.message,
            timestamp: entry.timestamp,
            metadata: entry.metadata,
        }
    }
}

/// One page of a flag's audit history.
#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    /// Entries, newest first.
    pub logs: Vec<LogEntryResponse>,

    /// Requested page.
    pub page: u32,

    /// Requested size.
    pub size: u32,

    /// Entries across all pages.
    pub total: usize,

    /// Number of pages.
    pub total_pages: usize,
}

impl From<Page<AuditEntry>> for LogsResponse {
    fn from(page: Page<AuditEntry>) -> Self {
        let page = page.map(LogEntryResponse::from);
        Self {
            logs: page.items,
            page: page.page,
            size: page.size,
            total: page.total,
            total_pages: page.total_pages,
        }
    }
}
