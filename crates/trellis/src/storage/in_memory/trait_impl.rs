//! `GraphStore` implementation for the in-memory store.

use super::InMemoryStore;
use super::graph::{neighbours, transitive_dependents_impl};
use crate::domain::{Flag, FlagId};
use crate::storage::{GraphStore, StoreResult};
use async_trait::async_trait;
use petgraph::Direction;
use std::collections::BTreeSet;

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Flag>> {
        let inner = self.lock().await;
        Ok(inner
            .names
            .get(name)
            .and_then(|id| inner.flags.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: FlagId) -> StoreResult<Option<Flag>> {
        let inner = self.lock().await;
        Ok(inner.flags.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &BTreeSet<FlagId>) -> StoreResult<Vec<Flag>> {
        let inner = self.lock().await;
        Ok(inner.collect_sorted(ids.iter().copied()))
    }

    async fn direct_dependencies(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        let inner = self.lock().await;
        let node = inner.node(id)?;
        Ok(inner.collect_sorted(neighbours(&inner.graph, node, Direction::Outgoing)))
    }

    async fn direct_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        let inner = self.lock().await;
        let node = inner.node(id)?;
        Ok(inner.collect_sorted(neighbours(&inner.graph, node, Direction::Incoming)))
    }

    async fn transitive_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        let inner = self.lock().await;
        let node = inner.node(id)?;
        Ok(inner.collect_sorted(transitive_dependents_impl(&inner.graph, node)))
    }

    async fn create_flag(
        &self,
        name: &str,
        active: bool,
        dependency_ids: &BTreeSet<FlagId>,
    ) -> StoreResult<Flag> {
        let mut inner = self.lock().await;
        inner.insert_flag(name, active, dependency_ids)
    }

    async fn set_active(&self, id: FlagId, active: bool) -> StoreResult<bool> {
        let mut inner = self.lock().await;
        inner.set_active(id, active)
    }

    async fn set_active_for_many(
        &self,
        ids: &BTreeSet<FlagId>,
        active: bool,
        only_if_currently_active: bool,
    ) -> StoreResult<Vec<FlagId>> {
        let mut inner = self.lock().await;
        inner.bulk_set_active(ids, active, only_if_currently_active)
    }
}
