//! Graph store abstraction for trellis.
//!
//! This module provides the [`GraphStore`] trait and a factory for creating
//! store backends:
//!
//! - **In-memory**: ephemeral storage backed by `HashMap` and petgraph
//! - **SQLite**: persistent storage in a single database file
//!
//! # Architecture
//!
//! The trait is async and object-safe so the engine can hold an
//! `Arc<dyn GraphStore>` regardless of backend. Receivers are `&self`;
//! backends use interior mutability (`tokio::sync::Mutex` for in-memory, a
//! connection mutex plus transactions for SQLite).
//!
//! # Test Utilities
//!
//! With the `test-util` feature, [`UnavailableStore`] is available: every call
//! fails (optionally after a delay) so callers can exercise their error paths.
//!
//! ```toml
//! [dev-dependencies]
//! trellis = { version = "...", features = ["test-util"] }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use trellis::storage::{StorageBackend, create_store};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = create_store(StorageBackend::InMemory).await?;
//!     let flag = store.create_flag("checkout", false, &BTreeSet::new()).await?;
//!     println!("Created flag {}", flag.id);
//!     Ok(())
//! }
//! ```

use crate::domain::{Flag, FlagId};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub mod in_memory;
pub mod sqlite;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage contract for flags and their dependency edges.
///
/// Implementations must be `Send + Sync`; the engine shares one handle across
/// all request tasks.
///
/// # Method Categories
///
/// - **Lookups**: `find_by_name`, `find_by_id`, `find_by_ids`
/// - **Graph queries**: `direct_dependencies`, `direct_dependents`, `transitive_dependents`
/// - **Mutations**: `create_flag`, `set_active`, `set_active_for_many`
///
/// # Atomicity
///
/// `create_flag` and `set_active_for_many` change several rows. Either every
/// row changes or none does; readers never see a partial result.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Exact, case-sensitive lookup by name. Absent is not an error.
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Flag>>;

    /// Lookup by id. Absent is not an error.
    async fn find_by_id(&self, id: FlagId) -> StoreResult<Option<Flag>>;

    /// Fetch the flags among `ids` that exist, in ascending id order.
    ///
    /// Missing ids are silently omitted; callers compare counts to detect them.
    async fn find_by_ids(&self, ids: &BTreeSet<FlagId>) -> StoreResult<Vec<Flag>>;

    /// Flags that `id` depends on, ascending.
    async fn direct_dependencies(&self, id: FlagId) -> StoreResult<Vec<Flag>>;

    /// Flags that depend directly on `id`, ascending.
    async fn direct_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>>;

    /// Every flag that depends on `id` through any chain of edges.
    ///
    /// The result excludes `id` itself, contains each flag once, and is sorted
    /// by ascending id. Cycles in the stored graph must not prevent
    /// termination.
    async fn transitive_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>>;

    /// Insert a flag and one edge per dependency id as a single atomic unit.
    ///
    /// An active flag is only inserted if every dependency is active at the
    /// moment of the write.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateName` if the name is taken
    /// - `StoreError::MissingFlag` if a dependency id does not exist
    /// - `StoreError::InactiveDependencies` if `active` is requested and some
    ///   dependencies are inactive
    async fn create_flag(
        &self,
        name: &str,
        active: bool,
        dependency_ids: &BTreeSet<FlagId>,
    ) -> StoreResult<Flag>;

    /// Set the active state of one flag.
    ///
    /// Returns `false` without writing when the flag is already in the
    /// requested state. Activation checks the flag's direct dependencies in
    /// the same atomic unit as the write.
    ///
    /// # Errors
    ///
    /// - `StoreError::MissingFlag` if the flag does not exist
    /// - `StoreError::InactiveDependencies` if activating and some direct
    ///   dependencies are inactive
    async fn set_active(&self, id: FlagId, active: bool) -> StoreResult<bool>;

    /// Set the active state of many flags atomically.
    ///
    /// Rows already in the target state are left alone. With
    /// `only_if_currently_active`, only rows that are active right now are
    /// considered. Returns the ids that actually changed, ascending.
    ///
    /// # Errors
    ///
    /// - `StoreError::MissingFlag` if any id does not exist
    /// - `StoreError::InactiveDependencies` if activating would leave an
    ///   active flag with an inactive direct dependency
    ///
    /// Nothing is written when an error is returned.
    async fn set_active_for_many(
        &self,
        ids: &BTreeSet<FlagId>,
        active: bool,
        only_if_currently_active: bool,
    ) -> StoreResult<Vec<FlagId>>;
}

/// Store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Ephemeral in-process storage.
    InMemory,

    /// SQLite database file.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Deadline for each call, lock waits included. A write that
        /// overruns it is rolled back.
        timeout: Duration,
    },
}

/// Create a store for the given backend.
///
/// # Errors
///
/// Returns `StoreError::Database` or `StoreError::Io` if the SQLite database
/// cannot be opened or its schema created.
pub async fn create_store(backend: StorageBackend) -> StoreResult<Arc<dyn GraphStore>> {
    match backend {
        StorageBackend::InMemory => Ok(in_memory::new_in_memory_store()),
        StorageBackend::Sqlite { path, timeout } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let store = sqlite::SqliteStore::open(path, timeout).await?;
            Ok(Arc::new(store))
        }
    }
}

// ========== Test Utilities ==========

/// A store whose every call fails with [`StoreError::Backend`].
///
/// With [`with_delay`](Self::with_delay) each call first sleeps, which lets
/// callers exercise their deadline handling.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct UnavailableStore {
    delay: Option<Duration>,
}

#[cfg(any(test, feature = "test-util"))]
impl UnavailableStore {
    /// Fail immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before failing.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    async fn fail<T>(&self, operation: &str) -> StoreResult<T> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(StoreError::Backend(format!("store unavailable ({operation})")))
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl GraphStore for UnavailableStore {
    async fn find_by_name(&self, _name: &str) -> StoreResult<Option<Flag>> {
        self.fail("find_by_name").await
    }

    async fn find_by_id(&self, _id: FlagId) -> StoreResult<Option<Flag>> {
        self.fail("find_by_id").await
    }

    async fn find_by_ids(&self, _ids: &BTreeSet<FlagId>) -> StoreResult<Vec<Flag>> {
        self.fail("find_by_ids").await
    }

    async fn direct_dependencies(&self, _id: FlagId) -> StoreResult<Vec<Flag>> {
        self.fail("direct_dependencies").await
    }

    async fn direct_dependents(&self, _id: FlagId) -> StoreResult<Vec<Flag>> {
        self.fail("direct_dependents").await
    }

    async fn transitive_dependents(&self, _id: FlagId) -> StoreResult<Vec<Flag>> {
        self.fail("transitive_dependents").await
    }

    async fn create_flag(
        &self,
        _name: &str,
        _active: bool,
        _dependency_ids: &BTreeSet<FlagId>,
    ) -> StoreResult<Flag> {
        self.fail("create_flag").await
    }

    async fn set_active(&self, _id: FlagId, _active: bool) -> StoreResult<bool> {
        self.fail("set_active").await
    }

    async fn set_active_for_many(
        &self,
        _ids: &BTreeSet<FlagId>,
        _active: bool,
        _only_if_currently_active: bool,
    ) -> StoreResult<Vec<FlagId>> {
        self.fail("set_active_for_many").await
    }
}
