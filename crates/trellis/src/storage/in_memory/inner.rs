//! Core in-memory data structures.
//!
//! [`InMemoryStoreInner`] is not thread-safe on its own; it is wrapped in
//! `Arc<Mutex<>>` by the parent module.

use super::graph::neighbours;
use crate::domain::{Flag, FlagId};
use crate::error::StoreError;
use crate::storage::StoreResult;
use chrono::Utc;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};

/// Inner store state.
///
/// Every flag in `flags` has exactly one entry in `node_map` and one in
/// `names`.
pub(crate) struct InMemoryStoreInner {
    /// Flags indexed by id
    pub(super) flags: HashMap<FlagId, Flag>,

    /// Name index for uniqueness checks and lookups
    pub(super) names: HashMap<String, FlagId>,

    /// Dependency graph; edge direction is dependent -> dependency
    pub(super) graph: DiGraph<FlagId, ()>,

    /// Mapping from flag id to graph node
    pub(super) node_map: HashMap<FlagId, NodeIndex>,

    /// Next id to hand out
    next_id: u64,

    /// Number of staged row writes allowed before a bulk update fails.
    #[cfg(test)]
    pub(super) fail_bulk_after: Option<usize>,
}

impl InMemoryStoreInner {
    pub(crate) fn new() -> Self {
        Self {
            flags: HashMap::new(),
            names: HashMap::new(),
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            next_id: 1,
            #[cfg(test)]
            fail_bulk_after: None,
        }
    }

    /// Insert a flag and its outgoing edges.
    ///
    /// All checks run before the first mutation, so a rejected insert leaves
    /// the store untouched.
    pub(super) fn insert_flag(
        &mut self,
        name: &str,
        active: bool,
        dependency_ids: &BTreeSet<FlagId>,
    ) -> StoreResult<Flag> {
        // === Phase 1: validation (no mutations) ===
        if self.names.contains_key(name) {
            return Err(StoreError::DuplicateName(name.to_string()));
        }
        if let Some(missing) = dependency_ids.iter().find(|id| !self.node_map.contains_key(id)) {
            return Err(StoreError::MissingFlag(*missing));
        }
        if active {
            let inactive: Vec<FlagId> = dependency_ids
                .iter()
                .copied()
                .filter(|id| !self.flags[id].is_active)
                .collect();
            if !inactive.is_empty() {
                return Err(StoreError::InactiveDependencies(inactive));
            }
        }

        // === Phase 2: insert ===
        let id = FlagId(self.next_id);
        self.next_id += 1;

        let now = Utc::now();
        let flag = Flag {
            id,
            name: name.to_string(),
            is_active: active,
            created_at: now,
            updated_at: now,
        };

        let node = self.graph.add_node(id);
        self.node_map.insert(id, node);
        for dependency in dependency_ids {
            let target = self.node_map[dependency];
            self.graph.add_edge(node, target, ());
        }
        self.names.insert(flag.name.clone(), id);
        self.flags.insert(id, flag.clone());

        Ok(flag)
    }

    /// Look up a node, mapping absence to [`StoreError::MissingFlag`].
    pub(super) fn node(&self, id: FlagId) -> StoreResult<NodeIndex> {
        self.node_map
            .get(&id)
            .copied()
            .ok_or(StoreError::MissingFlag(id))
    }

    /// Direct dependencies of `node` that are inactive, ascending.
    ///
    /// `pending` overrides the stored state of flags about to change.
    pub(super) fn inactive_dependencies(
        &self,
        node: NodeIndex,
        pending: &HashMap<FlagId, bool>,
    ) -> Vec<FlagId> {
        let mut inactive: Vec<FlagId> = neighbours(&self.graph, node, Direction::Outgoing)
            .into_iter()
            .filter(|id| {
                !pending
                    .get(id)
                    .copied()
                    .unwrap_or_else(|| self.flags.get(id).is_some_and(|f| f.is_active))
            })
            .collect();
        inactive.sort_unstable();
        inactive.dedup();
        inactive
    }

    /// Switch one flag, refusing an activation over inactive dependencies.
    pub(super) fn set_active(&mut self, id: FlagId, active: bool) -> StoreResult<bool> {
        let node = self.node(id)?;
        if self.flags[&id].is_active == active {
            return Ok(false);
        }
        if active {
            let inactive = self.inactive_dependencies(node, &HashMap::new());
            if !inactive.is_empty() {
                return Err(StoreError::InactiveDependencies(inactive));
            }
        }

        if let Some(flag) = self.flags.get_mut(&id) {
            flag.is_active = active;
            flag.updated_at = Utc::now();
        }
        Ok(true)
    }

    /// Clone the flags for the given ids, ascending. Unknown ids are skipped.
    pub(super) fn collect_sorted(&self, ids: impl IntoIterator<Item = FlagId>) -> Vec<Flag> {
        let mut flags: Vec<Flag> = ids
            .into_iter()
            .filter_map(|id| self.flags.get(&id).cloned())
            .collect();
        flags.sort_by_key(|f| f.id);
        flags.dedup_by_key(|f| f.id);
        flags
    }

    /// Apply a bulk state change in two steps: stage every row, then commit.
    ///
    /// Nothing is written unless every id exists and staging completes.
    pub(super) fn bulk_set_active(
        &mut self,
        ids: &BTreeSet<FlagId>,
        active: bool,
        only_if_currently_active: bool,
    ) -> StoreResult<Vec<FlagId>> {
        if let Some(missing) = ids.iter().find(|id| !self.flags.contains_key(id)) {
            return Err(StoreError::MissingFlag(*missing));
        }

        let now = Utc::now();
        let mut staged: Vec<Flag> = Vec::new();
        for id in ids {
            let current = &self.flags[id];
            if current.is_active == active || (only_if_currently_active && !current.is_active) {
                continue;
            }
            self.check_fault(staged.len())?;

            let mut next = current.clone();
            next.is_active = active;
            next.updated_at = now;
            staged.push(next);
        }

        if active {
            let pending: HashMap<FlagId, bool> = staged.iter().map(|f| (f.id, true)).collect();
            let mut inactive = BTreeSet::new();
            for flag in &staged {
                inactive.extend(self.inactive_dependencies(self.node(flag.id)?, &pending));
            }
            if !inactive.is_empty() {
                return Err(StoreError::InactiveDependencies(inactive.into_iter().collect()));
            }
        }

        let changed: Vec<FlagId> = staged.iter().map(|f| f.id).collect();
        for flag in staged {
            self.flags.insert(flag.id, flag);
        }
        Ok(changed)
    }

    #[cfg(test)]
    fn check_fault(&self, staged: usize) -> StoreResult<()> {
        match self.fail_bulk_after {
            Some(limit) if staged >= limit => Err(StoreError::Backend(format!(
                "injected failure after {staged} rows"
            ))),
            _ => Ok(()),
        }
    }

    #[cfg(not(test))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn check_fault(&self, _staged: usize) -> StoreResult<()> {
        Ok(())
    }
}
