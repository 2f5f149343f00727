//! Domain types for feature flags.
//!
//! A [`Flag`] is a named boolean toggle. Flags are linked by dependency
//! edges: an edge `(flag, depends_on)` means `flag` may only be active while
//! `depends_on` is active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum length of a flag name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length of a toggle reason, in characters.
pub const MAX_REASON_LENGTH: usize = 255;

/// Numeric surrogate key of a flag, assigned by the store at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagId(pub u64);

impl FlagId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FlagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FlagId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A stored feature flag.
///
/// `id` and `name` never change after creation; only `is_active` (and with
/// it `updated_at`) moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    /// Surrogate key.
    pub id: FlagId,

    /// Unique, case-sensitive name.
    pub name: String,

    /// Whether the flag is currently on.
    pub is_active: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFlag {
    /// Unique name, 1-255 characters.
    pub name: String,

    /// Requested initial state.
    #[serde(default)]
    pub active: bool,

    /// Flags the new flag depends on. Duplicates are collapsed.
    #[serde(default)]
    pub dependency_ids: Vec<FlagId>,
}

impl NewFlag {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, active: bool, dependency_ids: Vec<FlagId>) -> Self {
        Self {
            name: name.into(),
            active,
            dependency_ids,
        }
    }

    /// Validate the request payload.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)
    }

    /// The requested dependencies as a deduplicated, ascending set.
    #[must_use]
    pub fn dependency_set(&self) -> BTreeSet<FlagId> {
        self.dependency_ids.iter().copied().collect()
    }
}

/// Check a flag name against the naming rules.
///
/// # Errors
///
/// Returns a description of the violated rule.
pub fn validate_name(name: &str) -> Result<(), String> {
    check_text("name", name, MAX_NAME_LENGTH)
}

/// Check a toggle reason against the length rules.
///
/// # Errors
///
/// Returns a description of the violated rule.
pub fn validate_reason(reason: &str) -> Result<(), String> {
    check_text("reason", reason, MAX_REASON_LENGTH)
}

fn check_text(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    let length = value.chars().count();
    if length > max {
        return Err(format!(
            "{field} must be at most {max} characters (got {length})"
        ));
    }
    Ok(())
}

/// A flag together with its one-hop neighbourhood, as returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDetails {
    /// Surrogate key.
    pub id: FlagId,

    /// Flag name.
    pub name: String,

    /// Current state.
    pub active: bool,

    /// Flags this flag depends on, ascending.
    pub dependency_ids: Vec<FlagId>,

    /// Flags depending directly on this flag, ascending.
    pub dependent_ids: Vec<FlagId>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl FlagDetails {
    /// Assemble details from a flag and its direct neighbours.
    #[must_use]
    pub fn new(flag: Flag, dependencies: &[Flag], dependents: &[Flag]) -> Self {
        Self {
            id: flag.id,
            name: flag.name,
            active: flag.is_active,
            dependency_ids: sorted_ids(dependencies),
            dependent_ids: sorted_ids(dependents),
            created_at: flag.created_at,
            updated_at: flag.updated_at,
        }
    }
}

/// Ids of the given flags in ascending order.
#[must_use]
pub fn sorted_ids(flags: &[Flag]) -> Vec<FlagId> {
    let mut ids: Vec<FlagId> = flags.iter().map(|f| f.id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Ids of the flags in `flags` that are currently inactive, ascending.
#[must_use]
pub fn inactive_ids(flags: &[Flag]) -> Vec<FlagId> {
    let mut ids: Vec<FlagId> = flags.iter().filter(|f| !f.is_active).map(|f| f.id).collect();
    ids.sort_unstable();
    ids
}
