//! Application state.

use std::path::Path;
use std::sync::Arc;
use trellis::audit::create_audit_sink;
use trellis::config::TrellisConfig;
use trellis::engine::FlagEngine;
use trellis::storage::create_store;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The flag engine, built once at startup.
    pub engine: Arc<FlagEngine>,
}

impl AppState {
    /// Wrap an engine.
    #[must_use]
    pub fn new(engine: FlagEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Build the store, audit sink and engine described by `config`.
    ///
    /// Relative paths in `config` are resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns `trellis::Error::Config` for invalid settings and a store or
    /// audit error if a backend cannot be opened.
    pub async fn from_config(config: &TrellisConfig, base_dir: &Path) -> trellis::Result<Self> {
        let store_backend = config.storage.to_backend(base_dir)?;
        let audit_backend = config.audit.to_backend(base_dir)?;
        tracing::debug!(storage = ?store_backend, audit = ?audit_backend, "Opening backends");

        let store = create_store(store_backend).await?;
        let audit = create_audit_sink(audit_backend).await?;
        Ok(Self::new(FlagEngine::new(
            store,
            audit,
            config.engine_config(),
        )))
    }
}
