//! Results returned by engine operations.

use crate::domain::{Flag, FlagDetails, FlagId};

/// What happened to the audit entries of an operation.
///
/// Audit is recorded after the state change has committed, so none of these
/// variants affects whether the operation itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditStatus {
    /// Entries were written.
    Recorded,

    /// The audit policy asked for no entries.
    Skipped,

    /// Entries were handed to a background task.
    Dispatched,

    /// Writing failed; the message describes why.
    Failed(String),
}

impl AuditStatus {
    /// Whether the audit write failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Result of a successful `create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// The stored flag.
    pub flag: Flag,

    /// Its dependencies, ascending and deduplicated.
    pub dependency_ids: Vec<FlagId>,

    /// Outcome of the creation audit entry.
    pub audit: AuditStatus,
}

impl Created {
    /// Details view of the new flag. A new flag has no dependents yet.
    #[must_use]
    pub fn details(&self) -> FlagDetails {
        FlagDetails {
            id: self.flag.id,
            name: self.flag.name.clone(),
            active: self.flag.is_active,
            dependency_ids: self.dependency_ids.clone(),
            dependent_ids: Vec::new(),
            created_at: self.flag.created_at,
            updated_at: self.flag.updated_at,
        }
    }
}

/// A state change that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    /// The flag the caller addressed.
    pub flag_id: FlagId,

    /// Its new state.
    pub active: bool,

    /// Dependents switched off along with it, ascending. Always empty for
    /// activations.
    pub cascaded: Vec<FlagId>,

    /// Outcome of the audit entries.
    pub audit: AuditStatus,
}

/// Result of an activate or deactivate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The state changed.
    Applied(TransitionReport),

    /// The flag was already in the requested state; nothing was written.
    Unchanged {
        /// The addressed flag.
        flag_id: FlagId,
        /// Its current (and requested) state.
        active: bool,
    },
}

impl Transition {
    /// The addressed flag.
    #[must_use]
    pub fn flag_id(&self) -> FlagId {
        match self {
            Self::Applied(report) => report.flag_id,
            Self::Unchanged { flag_id, .. } => *flag_id,
        }
    }

    /// The flag's state after the call.
    #[must_use]
    pub fn active(&self) -> bool {
        match self {
            Self::Applied(report) => report.active,
            Self::Unchanged { active, .. } => *active,
        }
    }

    /// Whether anything was written.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Dependents switched off by this call.
    #[must_use]
    pub fn cascaded(&self) -> &[FlagId] {
        match self {
            Self::Applied(report) => &report.cascaded,
            Self::Unchanged { .. } => &[],
        }
    }
}
