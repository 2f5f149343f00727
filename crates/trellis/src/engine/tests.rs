use super::*;
use crate::audit::{CASCADE_MESSAGE, FailingAuditSink, MemoryAuditSink, keys};
use crate::error::ErrorKind;
use crate::storage::UnavailableStore;
use crate::storage::in_memory::new_in_memory_store;
use serde_json::Value;

struct Harness {
    engine: FlagEngine,
    audit: Arc<MemoryAuditSink>,
}

fn harness_with(config: EngineConfig) -> Harness {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = FlagEngine::new(new_in_memory_store(), audit.clone(), config);
    Harness { engine, audit }
}

fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

async fn create(engine: &FlagEngine, name: &str, active: bool, deps: &[u64]) -> FlagId {
    let deps = deps.iter().copied().map(FlagId).collect();
    engine
        .create(NewFlag::new(name, active, deps))
        .await
        .unwrap()
        .flag
        .id
}

#[tokio::test]
async fn create_records_one_audit_entry() {
    let h = harness();

    let created = h
        .engine
        .create(NewFlag::new("search", true, vec![]))
        .await
        .unwrap();

    assert_eq!(created.audit, AuditStatus::Recorded);
    let entries = h.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].flag_ref(keys::FLAG_ID), Some(created.flag.id));
}

#[tokio::test]
async fn create_rejects_taken_name() {
    let h = harness();
    create(&h.engine, "search", false, &[]).await;

    let err = h
        .engine
        .create(NewFlag::new("search", false, vec![]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn create_lists_every_missing_dependency() {
    let h = harness();
    create(&h.engine, "a", true, &[]).await;

    let err = h
        .engine
        .create(NewFlag::new("b", false, vec![FlagId(7), FlagId(1), FlagId(5)]))
        .await
        .unwrap_err();

    match err {
        Error::DependenciesNotFound(missing) => assert_eq!(missing, vec![FlagId(5), FlagId(7)]),
        other => panic!("expected DependenciesNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn inactive_dependencies_only_matter_when_creating_active() {
    let h = harness();
    let off = create(&h.engine, "off", false, &[]).await;

    let created = h
        .engine
        .create(NewFlag::new("inactive-child", false, vec![off]))
        .await
        .unwrap();

    assert_eq!(created.dependency_ids, vec![off]);
    assert!(!created.flag.is_active);
}

#[tokio::test]
async fn create_rejects_invalid_name_before_touching_store() {
    let engine = FlagEngine::new(
        Arc::new(UnavailableStore::new()),
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
    );

    let err = engine
        .create(NewFlag::new("  ", false, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidName(_)));
}

#[tokio::test]
async fn activation_reports_all_inactive_dependencies() {
    let h = harness();
    let a = create(&h.engine, "a", false, &[]).await;
    let b = create(&h.engine, "b", true, &[]).await;
    let c = create(&h.engine, "c", false, &[]).await;
    let child = create(&h.engine, "child", false, &[a.get(), b.get(), c.get()]).await;

    let err = h.engine.activate(child, "launch").await.unwrap_err();

    match err {
        Error::InactiveDependencies { inactive } => assert_eq!(inactive, vec![a, c]),
        other => panic!("expected InactiveDependencies, got {other:?}"),
    }
}

#[tokio::test]
async fn activation_is_local_and_unaudited_by_default() {
    let h = harness();
    let parent = create(&h.engine, "parent", false, &[]).await;
    let child = create(&h.engine, "child", false, &[parent.get()]).await;
    let before = h.audit.len().await;

    let outcome = h.engine.activate(parent, "launch").await.unwrap();

    assert!(outcome.is_applied());
    assert!(outcome.cascaded().is_empty());
    assert!(!h.engine.get(child).await.unwrap().active);
    assert_eq!(h.audit.len().await, before);
}

#[tokio::test]
async fn every_transition_policy_audits_activation() {
    let h = harness_with(EngineConfig {
        audit_policy: AuditPolicy::EveryTransition,
        ..EngineConfig::default()
    });
    let id = create(&h.engine, "beta", false, &[]).await;

    let outcome = h.engine.activate(id, "ready").await.unwrap();

    match outcome {
        Transition::Applied(report) => assert_eq!(report.audit, AuditStatus::Recorded),
        Transition::Unchanged { .. } => panic!("expected an applied transition"),
    }
    let last = h.audit.entries().await.pop().unwrap();
    assert_eq!(last.metadata[keys::REASON], Value::from("ready"));
}

#[tokio::test]
async fn repeated_transitions_are_unchanged_and_silent() {
    let h = harness();
    let id = create(&h.engine, "flag", true, &[]).await;
    let before = h.audit.len().await;

    let again_on = h.engine.activate(id, "again").await.unwrap();
    h.engine.deactivate(id, "off").await.unwrap();
    let after_off = h.audit.len().await;
    let again_off = h.engine.deactivate(id, "off again").await.unwrap();

    assert_eq!(again_on, Transition::Unchanged { flag_id: id, active: true });
    assert_eq!(again_off, Transition::Unchanged { flag_id: id, active: false });
    assert_eq!(after_off, before + 1);
    assert_eq!(h.audit.len().await, after_off);
}

#[tokio::test]
async fn deactivation_cascades_to_active_dependents_only() {
    let h = harness();
    let root = create(&h.engine, "root", true, &[]).await;
    let mid = create(&h.engine, "mid", true, &[root.get()]).await;
    let leaf = create(&h.engine, "leaf", true, &[mid.get()]).await;
    let idle = create(&h.engine, "idle", false, &[root.get()]).await;
    let bystander = create(&h.engine, "bystander", true, &[]).await;

    let outcome = h.engine.deactivate(root, "incident").await.unwrap();

    assert_eq!(outcome.cascaded(), &[mid, leaf]);
    for id in [root, mid, leaf, idle] {
        assert!(!h.engine.get(id).await.unwrap().active);
    }
    assert!(h.engine.get(bystander).await.unwrap().active);

    let cascade_entries: Vec<_> = h
        .audit
        .entries()
        .await
        .into_iter()
        .filter(|e| e.message == CASCADE_MESSAGE)
        .collect();
    assert_eq!(cascade_entries.len(), 2);
    assert!(cascade_entries
        .iter()
        .all(|e| e.flag_ref(keys::TRIGGERED_BY) == Some(root)));
}

#[tokio::test]
async fn reasons_are_required() {
    let h = harness();
    let id = create(&h.engine, "flag", true, &[]).await;

    let err = h.engine.deactivate(id, "").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(h.engine.get(id).await.unwrap().active);
}

#[tokio::test]
async fn unknown_flags_are_not_found() {
    let h = harness();

    assert!(matches!(
        h.engine.get(FlagId(3)).await,
        Err(Error::FlagNotFound(FlagId(3)))
    ));
    assert!(matches!(
        h.engine.logs(FlagId(3), PageRequest::default()).await,
        Err(Error::FlagNotFound(FlagId(3)))
    ));
    assert!(matches!(
        h.engine.set_active(FlagId(3), true, "x").await,
        Err(Error::FlagNotFound(FlagId(3)))
    ));
}

#[tokio::test]
async fn get_lists_both_directions() {
    let h = harness();
    let a = create(&h.engine, "a", true, &[]).await;
    let b = create(&h.engine, "b", true, &[a.get()]).await;
    let c = create(&h.engine, "c", false, &[b.get()]).await;

    let details = h.engine.get(b).await.unwrap();

    assert_eq!(details.name, "b");
    assert_eq!(details.dependency_ids, vec![a]);
    assert_eq!(details.dependent_ids, vec![c]);
}

#[tokio::test]
async fn audit_failure_does_not_undo_the_transition() {
    let engine = FlagEngine::new(
        new_in_memory_store(),
        Arc::new(FailingAuditSink),
        EngineConfig::default(),
    );
    let created = engine
        .create(NewFlag::new("flag", true, vec![]))
        .await
        .unwrap();
    assert!(created.audit.is_failed());

    let outcome = engine.deactivate(created.flag.id, "off").await.unwrap();

    match outcome {
        Transition::Applied(report) => assert!(report.audit.is_failed()),
        Transition::Unchanged { .. } => panic!("expected an applied transition"),
    }
    assert!(!engine.get(created.flag.id).await.unwrap().active);
}

#[tokio::test]
async fn slow_store_surfaces_as_retryable_timeout() {
    let engine = FlagEngine::new(
        Arc::new(UnavailableStore::with_delay(Duration::from_millis(500))),
        Arc::new(MemoryAuditSink::new()),
        EngineConfig {
            store_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        },
    );

    let err = engine.get(FlagId(1)).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Store(StoreError::Timeout { operation: "find_by_id", .. })
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn store_failure_is_a_store_error() {
    let engine = FlagEngine::new(
        Arc::new(UnavailableStore::new()),
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
    );

    let err = engine
        .create(NewFlag::new("flag", false, vec![]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
}

#[tokio::test]
async fn detached_delivery_eventually_records() {
    let h = harness_with(EngineConfig {
        audit_delivery: AuditDelivery::Detached,
        ..EngineConfig::default()
    });

    let created = h
        .engine
        .create(NewFlag::new("flag", false, vec![]))
        .await
        .unwrap();
    assert_eq!(created.audit, AuditStatus::Dispatched);

    for _ in 0..100 {
        if !h.audit.is_empty().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("detached audit entry never arrived");
}

// ========== Concurrent writers ==========

/// A write another caller lands between two of the engine's store calls.
enum Interloper {
    Deactivate(FlagId),
    CreateActive(&'static str, FlagId),
}

/// In-memory store that runs one [`Interloper`] write right after the
/// first call to `after` returns.
struct Interleaved {
    inner: Arc<dyn GraphStore>,
    after: &'static str,
    interloper: tokio::sync::Mutex<Option<Interloper>>,
}

impl Interleaved {
    fn new(inner: Arc<dyn GraphStore>, after: &'static str, interloper: Interloper) -> Self {
        Self {
            inner,
            after,
            interloper: tokio::sync::Mutex::new(Some(interloper)),
        }
    }

    async fn returned(&self, operation: &'static str) {
        if operation != self.after {
            return;
        }
        let Some(interloper) = self.interloper.lock().await.take() else {
            return;
        };
        match interloper {
            Interloper::Deactivate(id) => {
                let ids = [id].into_iter().collect();
                self.inner
                    .set_active_for_many(&ids, false, true)
                    .await
                    .unwrap();
            }
            Interloper::CreateActive(name, dependency) => {
                let ids = [dependency].into_iter().collect();
                self.inner.create_flag(name, true, &ids).await.unwrap();
            }
        }
    }
}

#[async_trait::async_trait]
impl GraphStore for Interleaved {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Flag>> {
        let found = self.inner.find_by_name(name).await;
        self.returned("find_by_name").await;
        found
    }

    async fn find_by_id(&self, id: FlagId) -> StoreResult<Option<Flag>> {
        let found = self.inner.find_by_id(id).await;
        self.returned("find_by_id").await;
        found
    }

    async fn find_by_ids(&self, ids: &BTreeSet<FlagId>) -> StoreResult<Vec<Flag>> {
        let found = self.inner.find_by_ids(ids).await;
        self.returned("find_by_ids").await;
        found
    }

    async fn direct_dependencies(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        let found = self.inner.direct_dependencies(id).await;
        self.returned("direct_dependencies").await;
        found
    }

    async fn direct_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        let found = self.inner.direct_dependents(id).await;
        self.returned("direct_dependents").await;
        found
    }

    async fn transitive_dependents(&self, id: FlagId) -> StoreResult<Vec<Flag>> {
        let found = self.inner.transitive_dependents(id).await;
        self.returned("transitive_dependents").await;
        found
    }

    async fn create_flag(
        &self,
        name: &str,
        active: bool,
        dependency_ids: &BTreeSet<FlagId>,
    ) -> StoreResult<Flag> {
        self.inner.create_flag(name, active, dependency_ids).await
    }

    async fn set_active(&self, id: FlagId, active: bool) -> StoreResult<bool> {
        self.inner.set_active(id, active).await
    }

    async fn set_active_for_many(
        &self,
        ids: &BTreeSet<FlagId>,
        active: bool,
        only_if_currently_active: bool,
    ) -> StoreResult<Vec<FlagId>> {
        self.inner
            .set_active_for_many(ids, active, only_if_currently_active)
            .await
    }
}

/// Engine over a store seeded with `dep`(1, active) and `child`(2, inactive,
/// depends on 1).
async fn interleaved(after: &'static str, interloper: Interloper) -> (FlagEngine, Arc<dyn GraphStore>) {
    let inner = new_in_memory_store();
    inner.create_flag("dep", true, &BTreeSet::new()).await.unwrap();
    let deps = [FlagId(1)].into_iter().collect();
    inner.create_flag("child", false, &deps).await.unwrap();

    let store: Arc<dyn GraphStore> = Arc::new(Interleaved::new(inner.clone(), after, interloper));
    let engine = FlagEngine::new(store, Arc::new(MemoryAuditSink::new()), EngineConfig::default());
    (engine, inner)
}

#[tokio::test]
async fn activation_loses_to_a_deactivation_landing_after_the_check() {
    let (engine, store) =
        interleaved("direct_dependencies", Interloper::Deactivate(FlagId(1))).await;

    let err = engine.activate(FlagId(2), "launch").await.unwrap_err();

    match err {
        Error::InactiveDependencies { inactive } => assert_eq!(inactive, vec![FlagId(1)]),
        other => panic!("expected InactiveDependencies, got {other:?}"),
    }
    assert!(!store.find_by_id(FlagId(2)).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn active_create_loses_to_a_deactivation_landing_after_the_check() {
    let (engine, store) = interleaved("find_by_ids", Interloper::Deactivate(FlagId(1))).await;

    let err = engine
        .create(NewFlag::new("late", true, vec![FlagId(1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InactiveDependencies { ref inactive } if inactive == &[FlagId(1)]));
    assert!(store.find_by_name("late").await.unwrap().is_none());
}

#[tokio::test]
async fn dependent_created_during_deactivation_is_switched_off() {
    let (engine, store) = interleaved(
        "transitive_dependents",
        Interloper::CreateActive("late", FlagId(1)),
    )
    .await;

    let outcome = engine.deactivate(FlagId(1), "incident").await.unwrap();

    match outcome {
        Transition::Applied(report) => assert_eq!(report.cascaded, vec![FlagId(3)]),
        other => panic!("expected an applied transition, got {other:?}"),
    }
    let late = store.find_by_name("late").await.unwrap().unwrap();
    assert!(!late.is_active);
}
