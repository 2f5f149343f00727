//! In-memory graph store using `HashMap` and petgraph.
//!
//! All data lives in RAM and is **lost when the process exits**. Suitable for
//! tests, demos and as the reference implementation of [`GraphStore`].
//!
//! # Architecture
//!
//! - `HashMap<FlagId, Flag>` for O(1) lookups
//! - `HashMap<String, FlagId>` name index enforcing uniqueness
//! - `petgraph::DiGraph<FlagId, ()>` for dependency edges
//! - `HashMap<FlagId, NodeIndex>` mapping flags to graph nodes
//!
//! ## Edge Direction
//!
//! Edges point from **dependent to dependency**: if `checkout` depends on
//! `payments`, the edge is `checkout -> payments`. Outgoing edges are a flag's
//! dependencies; incoming edges are its dependents.
//!
//! # Atomicity
//!
//! Every operation holds the mutex for its whole duration. Bulk updates are
//! staged first and committed only once every row has been prepared.
//!
//! # Thread Safety
//!
//! The store is an `Arc<Mutex<InMemoryStoreInner>>` using `tokio::sync::Mutex`.

mod graph;
mod inner;
mod trait_impl;

use crate::storage::GraphStore;
use inner::InMemoryStoreInner;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe in-memory store.
///
/// Implements [`GraphStore`] via `trait_impl.rs`.
pub(crate) type InMemoryStore = Arc<Mutex<InMemoryStoreInner>>;

/// Create a new, empty in-memory store. Ids start at 1.
///
/// ```
/// use trellis::storage::in_memory::new_in_memory_store;
///
/// let store = new_in_memory_store();
/// ```
#[must_use]
pub fn new_in_memory_store() -> Arc<dyn GraphStore> {
    let store: InMemoryStore = Arc::new(Mutex::new(InMemoryStoreInner::new()));
    Arc::new(store)
}
