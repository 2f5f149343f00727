//! Trellis - feature flags with dependency-aware state transitions.
//!
//! Flags are named boolean toggles connected by "depends-on" edges. The
//! [`engine::FlagEngine`] keeps every active flag's dependencies active:
//! activation is refused while a dependency is off, and deactivation switches
//! off every transitive dependent in one atomic write.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis::audit::MemoryAuditSink;
//! use trellis::domain::NewFlag;
//! use trellis::engine::{EngineConfig, FlagEngine};
//! use trellis::storage::in_memory::new_in_memory_store;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = FlagEngine::new(
//!         new_in_memory_store(),
//!         Arc::new(MemoryAuditSink::new()),
//!         EngineConfig::default(),
//!     );
//!
//!     let payments = engine.create(NewFlag::new("payments", true, vec![])).await?;
//!     let checkout = engine
//!         .create(NewFlag::new("checkout", true, vec![payments.flag.id]))
//!         .await?;
//!
//!     let outcome = engine.deactivate(payments.flag.id, "provider outage").await?;
//!     assert_eq!(outcome.cascaded(), &[checkout.flag.id]);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod pagination;
pub mod storage;

pub use error::{Error, ErrorKind, Result};
