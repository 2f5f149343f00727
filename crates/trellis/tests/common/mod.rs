//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use trellis::audit::MemoryAuditSink;
use trellis::domain::{FlagId, NewFlag};
use trellis::engine::{EngineConfig, FlagEngine};
use trellis::storage::{GraphStore, StorageBackend, create_store};

/// Store backends the engine tests run against.
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    Sqlite,
}

/// An engine wired to a fresh store and an inspectable audit sink.
pub struct TestEngine {
    pub engine: FlagEngine,
    pub store: Arc<dyn GraphStore>,
    pub audit: Arc<MemoryAuditSink>,
    /// Keeps the SQLite file alive for the duration of the test.
    _dir: TempDir,
}

impl TestEngine {
    pub async fn new(backend: Backend) -> Self {
        Self::with_config(backend, EngineConfig::default()).await
    }

    pub async fn with_config(backend: Backend, config: EngineConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = match backend {
            Backend::Memory => create_store(StorageBackend::InMemory).await.unwrap(),
            Backend::Sqlite => create_store(StorageBackend::Sqlite {
                path: dir.path().join("flags.db"),
                timeout: Duration::from_secs(2),
            })
            .await
            .unwrap(),
        };
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = FlagEngine::new(store.clone(), audit.clone(), config);
        Self {
            engine,
            store,
            audit,
            _dir: dir,
        }
    }

    /// Create a flag and return its id.
    pub async fn flag(&self, name: &str, active: bool, deps: &[FlagId]) -> FlagId {
        self.engine
            .create(NewFlag::new(name, active, deps.to_vec()))
            .await
            .unwrap()
            .flag
            .id
    }

    /// Current state of a flag, read straight from the store.
    pub async fn is_active(&self, id: FlagId) -> bool {
        self.store.find_by_id(id).await.unwrap().unwrap().is_active
    }

    /// Ids of every active flag among `ids`.
    pub async fn active_among(&self, ids: &[FlagId]) -> BTreeSet<FlagId> {
        let mut active = BTreeSet::new();
        for id in ids {
            if self.is_active(*id).await {
                active.insert(*id);
            }
        }
        active
    }
}
