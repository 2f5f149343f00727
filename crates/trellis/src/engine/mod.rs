//! The dependency engine.
//!
//! [`FlagEngine`] validates proposed transitions against the dependency
//! graph, computes deactivation cascades and records audit entries.
//!
//! # Rules
//!
//! - A flag may only be active while every direct dependency is active.
//! - Activation touches one flag and never cascades.
//! - Deactivation switches off the flag and every transitive dependent that
//!   is still active, in one atomic store write. Dependents created active
//!   while that write was in flight are switched off right after.
//! - Dependency checks run again inside the store write, so a concurrent
//!   deactivation cannot leave an active flag over an inactive dependency.
//! - Audit entries are written after the store write commits. Audit failures
//!   are logged and reported in the outcome; they never undo a state change.
//!
//! Store and sink handles are injected at construction; the engine itself
//! holds no mutable state and can be shared freely behind an `Arc`.

mod outcome;

pub use outcome::{AuditStatus, Created, Transition, TransitionReport};

use crate::audit::{AuditEntry, AuditPolicy, AuditSink};
use crate::domain::{
    Flag, FlagDetails, FlagId, NewFlag, inactive_ids, sorted_ids, validate_reason,
};
use crate::error::{AuditError, Error, Result, StoreError};
use crate::pagination::{Page, PageRequest};
use crate::storage::{GraphStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default deadline applied to each store read.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// How audit entries reach the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditDelivery {
    /// Awaited after the store write; failures show up in the outcome.
    #[default]
    Inline,

    /// Spawned onto the runtime; the caller never waits for the sink.
    Detached,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deadline for each store read and inline audit call. Writes are
    /// bounded by the store itself.
    pub store_timeout: Duration,

    /// Which transitions are audited.
    pub audit_policy: AuditPolicy,

    /// Inline or detached audit writes.
    pub audit_delivery: AuditDelivery,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            audit_policy: AuditPolicy::default(),
            audit_delivery: AuditDelivery::default(),
        }
    }
}

/// Feature flag engine.
pub struct FlagEngine {
    store: Arc<dyn GraphStore>,
    audit: Arc<dyn AuditSink>,
    config: EngineConfig,
}

impl FlagEngine {
    /// Build an engine over the given store and audit sink.
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, audit: Arc<dyn AuditSink>, config: EngineConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one store call under the configured deadline.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> Result<T> {
        let after = self.config.store_timeout;
        match tokio::time::timeout(after, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Store(StoreError::Timeout { operation, after })),
        }
    }

    /// Await a store write to its real outcome.
    ///
    /// Stores enforce their own deadline on writes and roll back on overrun,
    /// so a timeout reported here means nothing was committed.
    async fn committed<T>(&self, call: impl Future<Output = StoreResult<T>>) -> Result<T> {
        call.await.map_err(Error::from)
    }

    async fn require_flag(&self, id: FlagId) -> Result<Flag> {
        self.bounded("find_by_id", self.store.find_by_id(id))
            .await?
            .ok_or(Error::FlagNotFound(id))
    }

    // ========== Transitions ==========

    /// Create a flag, optionally active, with dependency edges.
    ///
    /// All checks run before anything is written:
    ///
    /// 1. the name is valid and unused
    /// 2. every dependency id exists
    /// 3. if `active` is requested, every dependency is active
    ///
    /// # Errors
    ///
    /// - `Error::InvalidName` for a malformed name
    /// - `Error::NameConflict` if the name is taken
    /// - `Error::DependenciesNotFound` listing every unknown id
    /// - `Error::InactiveDependencies` listing every inactive dependency
    /// - `Error::Store` if the store fails or times out
    pub async fn create(&self, new_flag: NewFlag) -> Result<Created> {
        new_flag.validate().map_err(Error::InvalidName)?;

        if self
            .bounded("find_by_name", self.store.find_by_name(&new_flag.name))
            .await?
            .is_some()
        {
            debug!(name = %new_flag.name, "Rejected flag creation: name in use");
            return Err(Error::NameConflict(new_flag.name));
        }

        let dependency_ids = new_flag.dependency_set();
        if !dependency_ids.is_empty() {
            let found = self
                .bounded("find_by_ids", self.store.find_by_ids(&dependency_ids))
                .await?;

            if found.len() != dependency_ids.len() {
                let found_ids: BTreeSet<FlagId> = found.iter().map(|f| f.id).collect();
                let missing: Vec<FlagId> =
                    dependency_ids.difference(&found_ids).copied().collect();
                debug!(name = %new_flag.name, ?missing, "Rejected flag creation: unknown dependencies");
                return Err(Error::DependenciesNotFound(missing));
            }

            if new_flag.active {
                let inactive = inactive_ids(&found);
                if !inactive.is_empty() {
                    debug!(name = %new_flag.name, ?inactive, "Rejected flag creation: inactive dependencies");
                    return Err(Error::InactiveDependencies { inactive });
                }
            }
        }

        let flag = self
            .committed(
                self.store
                    .create_flag(&new_flag.name, new_flag.active, &dependency_ids),
            )
            .await?;

        info!(
            flag_id = %flag.id,
            name = %flag.name,
            active = flag.is_active,
            dependencies = dependency_ids.len(),
            "Created flag"
        );

        let audit = self
            .record(vec![AuditEntry::created(flag.id, flag.is_active)])
            .await;

        Ok(Created {
            flag,
            dependency_ids: dependency_ids.into_iter().collect(),
            audit,
        })
    }

    /// Switch a flag on.
    ///
    /// Returns [`Transition::Unchanged`] if it is already on. Activation never
    /// cascades.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidReason` for an empty or overlong reason
    /// - `Error::FlagNotFound` for an unknown id
    /// - `Error::InactiveDependencies` listing every inactive direct dependency
    /// - `Error::Store` if the store fails or times out
    pub async fn activate(&self, id: FlagId, reason: &str) -> Result<Transition> {
        validate_reason(reason).map_err(Error::InvalidReason)?;
        let flag = self.require_flag(id).await?;

        if flag.is_active {
            debug!(flag_id = %id, "Activation skipped: already active");
            return Ok(Transition::Unchanged {
                flag_id: id,
                active: true,
            });
        }

        let dependencies = self
            .bounded("direct_dependencies", self.store.direct_dependencies(id))
            .await?;
        let inactive = inactive_ids(&dependencies);
        if !inactive.is_empty() {
            debug!(flag_id = %id, ?inactive, "Rejected activation: inactive dependencies");
            return Err(Error::InactiveDependencies { inactive });
        }

        // The store re-checks the dependencies atomically with the write.
        let changed = self.committed(self.store.set_active(id, true)).await?;
        if !changed {
            return Ok(Transition::Unchanged {
                flag_id: id,
                active: true,
            });
        }

        info!(flag_id = %id, "Activated flag");

        let audit = if self.config.audit_policy.records_activation() {
            self.record(vec![AuditEntry::toggled(id, true, reason)])
                .await
        } else {
            AuditStatus::Skipped
        };

        Ok(Transition::Applied(TransitionReport {
            flag_id: id,
            active: true,
            cascaded: Vec::new(),
            audit,
        }))
    }

    /// Switch a flag off together with every active transitive dependent.
    ///
    /// Returns [`Transition::Unchanged`] if the flag is already off; in that
    /// case nothing is written and nothing is audited.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidReason` for an empty or overlong reason
    /// - `Error::FlagNotFound` for an unknown id
    /// - `Error::Store` if the store fails or times out; no flag changes then
    pub async fn deactivate(&self, id: FlagId, reason: &str) -> Result<Transition> {
        validate_reason(reason).map_err(Error::InvalidReason)?;
        let flag = self.require_flag(id).await?;

        if !flag.is_active {
            debug!(flag_id = %id, "Deactivation skipped: already inactive");
            return Ok(Transition::Unchanged {
                flag_id: id,
                active: false,
            });
        }

        let closure = self
            .bounded("transitive_dependents", self.store.transitive_dependents(id))
            .await?;
        let mut targets: BTreeSet<FlagId> = sorted_ids(&closure).into_iter().collect();
        targets.insert(id);

        let mut changed = self
            .committed(self.store.set_active_for_many(&targets, false, true))
            .await?;
        if changed.is_empty() {
            debug!(flag_id = %id, "Deactivation raced with another writer; nothing left to change");
            return Ok(Transition::Unchanged {
                flag_id: id,
                active: false,
            });
        }

        // A dependent created active after the closure was read escapes the
        // first write; switch those off until none are left. The first write
        // has committed, so a failure here is logged rather than returned.
        loop {
            let stragglers = match self
                .bounded("transitive_dependents", self.store.transitive_dependents(id))
                .await
            {
                Ok(closure) => closure
                    .iter()
                    .filter(|f| f.is_active)
                    .map(|f| f.id)
                    .collect::<BTreeSet<FlagId>>(),
                Err(e) => {
                    warn!(flag_id = %id, error = %e, "Could not re-check dependents after deactivation");
                    break;
                }
            };
            if stragglers.is_empty() {
                break;
            }
            debug!(flag_id = %id, stragglers = stragglers.len(), "Switching off late dependents");
            match self
                .committed(self.store.set_active_for_many(&stragglers, false, true))
                .await
            {
                Ok(more) => changed.extend(more),
                Err(e) => {
                    warn!(flag_id = %id, error = %e, "Could not switch off late dependents");
                    break;
                }
            }
        }
        changed.sort_unstable();
        changed.dedup();

        let cascaded: Vec<FlagId> = changed.iter().copied().filter(|c| *c != id).collect();
        info!(
            flag_id = %id,
            cascaded = cascaded.len(),
            closure = closure.len(),
            "Deactivated flag"
        );

        let mut entries: Vec<AuditEntry> = cascaded
            .iter()
            .map(|dependent| AuditEntry::cascaded(*dependent, id))
            .collect();
        if changed.contains(&id) {
            entries.push(AuditEntry::toggled(id, false, reason));
        }
        let audit = self.record(entries).await;

        Ok(Transition::Applied(TransitionReport {
            flag_id: id,
            active: false,
            cascaded,
            audit,
        }))
    }

    /// Dispatch to [`activate`](Self::activate) or
    /// [`deactivate`](Self::deactivate).
    ///
    /// # Errors
    ///
    /// See the two operations.
    pub async fn set_active(&self, id: FlagId, active: bool, reason: &str) -> Result<Transition> {
        if active {
            self.activate(id, reason).await
        } else {
            self.deactivate(id, reason).await
        }
    }

    // ========== Queries ==========

    /// A flag without its edges.
    ///
    /// # Errors
    ///
    /// - `Error::FlagNotFound` for an unknown id
    /// - `Error::Store` if the store fails or times out
    pub async fn flag(&self, id: FlagId) -> Result<Flag> {
        self.require_flag(id).await
    }

    /// A flag with its direct dependencies and dependents.
    ///
    /// # Errors
    ///
    /// - `Error::FlagNotFound` for an unknown id
    /// - `Error::Store` if the store fails or times out
    pub async fn get(&self, id: FlagId) -> Result<FlagDetails> {
        let flag = self.require_flag(id).await?;
        let dependencies = self
            .bounded("direct_dependencies", self.store.direct_dependencies(id))
            .await?;
        let dependents = self
            .bounded("direct_dependents", self.store.direct_dependents(id))
            .await?;
        Ok(FlagDetails::new(flag, &dependencies, &dependents))
    }

    /// Audit history of a flag, newest first.
    ///
    /// Includes entries where the flag was the trigger of a cascade.
    ///
    /// # Errors
    ///
    /// - `Error::FlagNotFound` for an unknown id
    /// - `Error::Audit` if the sink fails or times out
    pub async fn logs(&self, id: FlagId, page: PageRequest) -> Result<Page<AuditEntry>> {
        self.require_flag(id).await?;
        let after = self.config.store_timeout;
        match tokio::time::timeout(after, self.audit.query_by_flag(id, page)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::Audit(AuditError::Timeout(after))),
        }
    }

    // ========== Audit ==========

    /// Write audit entries according to the delivery mode.
    async fn record(&self, entries: Vec<AuditEntry>) -> AuditStatus {
        if entries.is_empty() {
            return AuditStatus::Skipped;
        }

        match self.config.audit_delivery {
            AuditDelivery::Inline => {
                let count = entries.len();
                let after = self.config.store_timeout;
                let result = match tokio::time::timeout(after, self.audit.append_batch(entries)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(AuditError::Timeout(after)),
                };
                match result {
                    Ok(()) => AuditStatus::Recorded,
                    Err(e) => {
                        warn!(error = %e, entries = count, "Failed to record audit entries");
                        AuditStatus::Failed(e.to_string())
                    }
                }
            }
            AuditDelivery::Detached => {
                let audit = Arc::clone(&self.audit);
                tokio::spawn(async move {
                    let count = entries.len();
                    if let Err(e) = audit.append_batch(entries).await {
                        warn!(error = %e, entries = count, "Failed to record audit entries");
                    }
                });
                AuditStatus::Dispatched
            }
        }
    }
}

#[cfg(test)]
mod tests;
