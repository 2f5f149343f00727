//! Configuration file handling.
//!
//! Configuration is a YAML file; every section and field may be omitted.
//!
//! ```yaml
//! server:
//!   bind: 127.0.0.1:8080
//! storage:
//!   backend: sqlite
//!   path: trellis.db
//!   timeout-ms: 5000
//! audit:
//!   backend: jsonl
//!   path: trellis-audit.jsonl
//!   policy: creation-and-deactivation
//!   delivery: inline
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use crate::audit::{AuditBackend, AuditPolicy};
use crate::engine::{AuditDelivery, EngineConfig};
use crate::error::{Error, Result};
use crate::storage::StorageBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default SQLite database file
pub const DEFAULT_DB_FILE: &str = "trellis.db";

/// Default audit log file
pub const DEFAULT_AUDIT_FILE: &str = "trellis-audit.jsonl";

/// Default per-call store deadline in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TrellisConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Graph store settings
    pub storage: StorageConfig,

    /// Audit log settings
    pub audit: AuditConfig,
}

/// Server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Storage section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Backend type: "sqlite" or "memory"
    pub backend: String,

    /// Database file (sqlite only)
    pub path: PathBuf,

    /// Per-call deadline in milliseconds
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: PathBuf::from(DEFAULT_DB_FILE),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl StorageConfig {
    /// Per-call deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve into a backend, anchoring relative paths at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown backend or a zero timeout.
    pub fn to_backend(&self, base_dir: &Path) -> Result<StorageBackend> {
        if self.timeout_ms == 0 {
            return Err(Error::Config(
                "storage.timeout-ms must be greater than zero".to_string(),
            ));
        }
        match self.backend.as_str() {
            "memory" => Ok(StorageBackend::InMemory),
            "sqlite" => Ok(StorageBackend::Sqlite {
                path: resolve(base_dir, &self.path),
                timeout: self.timeout(),
            }),
            other => Err(Error::Config(format!(
                "unknown storage backend '{other}' (expected 'sqlite' or 'memory')"
            ))),
        }
    }
}

/// Audit section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Backend type: "jsonl" or "memory"
    pub backend: String,

    /// Log file (jsonl only)
    pub path: PathBuf,

    /// Which transitions are recorded
    pub policy: AuditPolicy,

    /// Inline or detached writes
    pub delivery: AuditDelivery,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: "jsonl".to_string(),
            path: PathBuf::from(DEFAULT_AUDIT_FILE),
            policy: AuditPolicy::default(),
            delivery: AuditDelivery::default(),
        }
    }
}

impl AuditConfig {
    /// Resolve into a backend, anchoring relative paths at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown backend.
    pub fn to_backend(&self, base_dir: &Path) -> Result<AuditBackend> {
        match self.backend.as_str() {
            "memory" => Ok(AuditBackend::InMemory),
            "jsonl" => Ok(AuditBackend::Jsonl(resolve(base_dir, &self.path))),
            other => Err(Error::Config(format!(
                "unknown audit backend '{other}' (expected 'jsonl' or 'memory')"
            ))),
        }
    }
}

impl TrellisConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it is not valid configuration.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text. Empty text yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text is not valid configuration.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_timeout: self.storage.timeout(),
            audit_policy: self.audit.policy,
            audit_delivery: self.audit.delivery,
        }
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn empty_file_means_defaults() {
        let config = TrellisConfig::from_yaml("").unwrap();

        assert_eq!(config, TrellisConfig::default());
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = TrellisConfig::from_yaml(
            "storage:\n  backend: memory\naudit:\n  policy: every-transition\n  delivery: detached\n",
        )
        .unwrap();

        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.audit.policy, AuditPolicy::EveryTransition);
        assert_eq!(config.audit.delivery, AuditDelivery::Detached);
        assert_eq!(config.audit.backend, "jsonl");
    }

    #[rstest]
    #[case::unknown_key("storage:\n  colour: blue\n")]
    #[case::bad_policy("audit:\n  policy: sometimes\n")]
    #[case::not_a_map("- 1\n- 2\n")]
    fn invalid_yaml_is_a_config_error(#[case] yaml: &str) {
        assert!(matches!(
            TrellisConfig::from_yaml(yaml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        let config = TrellisConfig::default();
        let base = Path::new("/srv/trellis");

        let storage = config.storage.to_backend(base).unwrap();
        let audit = config.audit.to_backend(base).unwrap();

        assert_eq!(
            storage,
            StorageBackend::Sqlite {
                path: base.join(DEFAULT_DB_FILE),
                timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            }
        );
        assert_eq!(audit, AuditBackend::Jsonl(base.join(DEFAULT_AUDIT_FILE)));
    }

    #[test]
    fn unknown_backends_are_rejected() {
        let storage = StorageConfig {
            backend: "postgres".into(),
            ..StorageConfig::default()
        };
        let audit = AuditConfig {
            backend: "mongo".into(),
            ..AuditConfig::default()
        };

        assert!(matches!(storage.to_backend(Path::new(".")), Err(Error::Config(_))));
        assert!(matches!(audit.to_backend(Path::new(".")), Err(Error::Config(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let storage = StorageConfig {
            timeout_ms: 0,
            ..StorageConfig::default()
        };

        assert!(matches!(storage.to_backend(Path::new(".")), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn load_reads_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trellis.yaml");
        tokio::fs::write(&path, "server:\n  bind: 0.0.0.0:9000\n")
            .await
            .unwrap();

        let config = TrellisConfig::load(&path).await.unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();

        let err = TrellisConfig::load(&dir.path().join("absent.yaml"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
    }
}
