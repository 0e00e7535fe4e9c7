//! End-to-end save pipeline tests over the in-memory document store:
//! create/update/delete lifecycle, consistency and cardinality failures,
//! whole-transaction rollback, concurrent writers, and dispatch wiring.

use async_trait::async_trait;
use heron_db_core::{
    vocab, AliasResolver, ArtifactKind, GraphIndex, LockConfig, NamespaceTable, ResourceKey,
    StoreConfig, Value,
};
use heron_db_dispatch::{
    Composite, Dispatcher, MemoryJobQueue, OperationType, ResourcesAndPredicates,
};
use heron_db_docstore::{DocStore, MemoryDocStore};
use heron_db_transact::{ChangeMeta, TransactError, TxnStatus, WriteEngine};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const EX: &str = "http://example.org/ns#";

fn uri(local: &str) -> String {
    format!("{}{}", EX, local)
}

fn resolver() -> Arc<NamespaceTable> {
    Arc::new(NamespaceTable::new().with_namespace("ex", EX))
}

fn config() -> StoreConfig {
    StoreConfig::new("main", "people").with_lock(LockConfig {
        max_retries: 50,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    })
}

fn engine(store: MemoryDocStore) -> WriteEngine {
    WriteEngine::new(Arc::new(store), Arc::new(config()), resolver())
}

fn graph(triples: &[(&str, &str, Value)]) -> GraphIndex {
    let mut g = GraphIndex::new();
    for (s, p, v) in triples {
        g.add(uri(s), uri(p), v.clone());
    }
    g
}

#[tokio::test]
async fn test_create_initializes_version_zero_and_logs() {
    let store = MemoryDocStore::new();
    let engine = engine(store.clone());

    let after = graph(&[("a", "label", Value::literal("hello"))]);
    let receipt = engine
        .save_changes(&GraphIndex::new(), &after, "default", ChangeMeta::now())
        .await
        .unwrap();

    assert!(!receipt.is_no_op());
    assert_eq!(receipt.addition_count, 1);
    assert_eq!(receipt.removal_count, 0);
    assert_eq!(receipt.created_subjects, vec![uri("a")]);
    assert!(receipt.updated_subjects.is_empty());

    let doc = store.get("main__people", "ex:a|default").await.unwrap().unwrap();
    assert_eq!(doc["_version"], 0);
    assert_eq!(store.count("main__people_locks"), 0);

    let txn = engine
        .transaction_log()
        .get_transaction(&receipt.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.status, TxnStatus::Completed);
    assert_eq!(txn.original_cbds.len(), 1);
    assert!(txn.original_cbds[0].is_placeholder());
    assert_eq!(txn.new_cbds[0].version, Some(0));
}

#[tokio::test]
async fn test_label_swap_increments_version() {
    let store = MemoryDocStore::new();
    let engine = engine(store.clone());

    let v0 = graph(&[("a", "label", Value::literal("old"))]);
    engine
        .save_changes(&GraphIndex::new(), &v0, "default", ChangeMeta::now())
        .await
        .unwrap();

    let v1 = graph(&[("a", "label", Value::literal("new"))]);
    let receipt = engine
        .save_changes(&v0, &v1, "default", ChangeMeta::now())
        .await
        .unwrap();
    assert_eq!(receipt.addition_count, 1);
    assert_eq!(receipt.removal_count, 1);

    let doc = store.get("main__people", "ex:a|default").await.unwrap().unwrap();
    assert_eq!(doc["_version"], 1);
    let current = engine.get_resource(&uri("a"), "default").await.unwrap().unwrap();
    assert_eq!(current, v1);
}

#[tokio::test]
async fn test_versions_are_monotonic_across_saves() {
    let store = MemoryDocStore::new();
    let engine = engine(store.clone());

    let mut before = GraphIndex::new();
    for n in 0..3u64 {
        let after = graph(&[("a", "counter", Value::literal(n.to_string()))]);
        engine
            .save_changes(&before, &after, "default", ChangeMeta::now())
            .await
            .unwrap();
        let doc = store.get("main__people", "ex:a|default").await.unwrap().unwrap();
        assert_eq!(doc["_version"], n);
        before = after;
    }
}

#[tokio::test]
async fn test_no_op_save_writes_nothing() {
    let store = MemoryDocStore::new();
    let engine = engine(store.clone());

    let g = graph(&[("a", "label", Value::literal("same"))]);
    let receipt = engine
        .save_changes(&g, &g, "default", ChangeMeta::now())
        .await
        .unwrap();
    assert!(receipt.is_no_op());
    assert!(receipt.transaction_id.is_empty());
    assert_eq!(store.count("main__people"), 0);
    assert_eq!(store.count("main__transactions"), 0);
}

#[tokio::test]
async fn test_stale_removal_fails_and_leaves_no_trace() {
    let store = MemoryDocStore::new();
    let engine = engine(store.clone());

    // The caller claims ex:a already holds a label; it does not.
    let before = graph(&[("a", "label", Value::literal("phantom"))]);
    let err = engine
        .save_changes(&before, &GraphIndex::new(), "default", ChangeMeta::now())
        .await
        .unwrap_err();
    assert!(matches!(err, TransactError::ConsistencyViolation { .. }));

    // Nothing committed, no lock left behind, attempt logged as failed.
    assert_eq!(store.count("main__people_locks"), 0);
    assert!(engine.get_resource(&uri("a"), "default").await.unwrap().is_none());
    let failed = engine
        .transaction_log()
        .get_completed_transactions(None, None, None, None)
        .await
        .unwrap();
    assert!(failed.is_empty());
}

#[tokio::test]
async fn test_rollback_restores_committed_sibling_documents() {
    let store = MemoryDocStore::new();
    let engine = engine(store.clone());

    let seed = graph(&[("a", "label", Value::literal("x"))]);
    engine
        .save_changes(&GraphIndex::new(), &seed, "default", ChangeMeta::now())
        .await
        .unwrap();
    let doc_before = store.get("main__people", "ex:a|default").await.unwrap().unwrap();

    // Two-subject transaction: ex:a's edit is valid and applies first, then
    // ex:b's stale removal aborts the transaction.
    let mut before = seed.clone();
    before.add(uri("b"), uri("label"), Value::literal("ghost"));
    let after = graph(&[("a", "label", Value::literal("y"))]);

    let err = engine
        .save_changes(&before, &after, "default", ChangeMeta::now())
        .await
        .unwrap_err();
    assert!(matches!(err, TransactError::ConsistencyViolation { .. }));

    // ex:a's mid-transaction commit was undone, down to the exact document.
    let doc_after = store.get("main__people", "ex:a|default").await.unwrap().unwrap();
    assert_eq!(doc_after, doc_before);
    assert_eq!(
        engine.get_resource(&uri("a"), "default").await.unwrap().unwrap(),
        seed
    );
    assert!(engine.get_resource(&uri("b"), "default").await.unwrap().is_none());
    assert_eq!(store.count("main__people_locks"), 0);

    // The log carries the failure and the snapshots rollback used.
    let failed: Vec<_> = {
        let t1 = engine.transaction_log();
        let mut out = Vec::new();
        for (_, doc) in store.scan("main__transactions").await.unwrap() {
            let id = doc["id"].as_str().unwrap().to_string();
            out.push(t1.get_transaction(&id).await.unwrap().unwrap());
        }
        out.into_iter()
            .filter(|r| r.status == TxnStatus::Failed)
            .collect()
    };
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].original_cbds.len(), 2);
    assert!(failed[0].error.is_some());
}

#[tokio::test]
async fn test_cardinality_violation_fails_before_locking() {
    let store = MemoryDocStore::new();
    let config = config().with_single_valued(uri("status"));
    let engine = WriteEngine::new(Arc::new(store.clone()), Arc::new(config), resolver());

    let mut after = GraphIndex::new();
    after.add(uri("a"), uri("status"), Value::literal("active"));
    after.add(uri("a"), uri("status"), Value::literal("archived"));

    let err = engine
        .save_changes(&GraphIndex::new(), &after, "default", ChangeMeta::now())
        .await
        .unwrap_err();
    assert!(matches!(err, TransactError::CardinalityViolation { .. }));

    // Rejected before any collection was touched.
    assert_eq!(store.count("main__people"), 0);
    assert_eq!(store.count("main__people_locks"), 0);
    assert_eq!(store.count("main__transactions"), 0);
}

#[tokio::test]
async fn test_delete_all_leaves_versioned_tombstone() {
    let store = MemoryDocStore::new();
    let engine = engine(store.clone());

    let live = graph(&[
        ("c", "label", Value::literal("bye")),
        ("c", "tag", Value::literal("old")),
    ]);
    engine
        .save_changes(&GraphIndex::new(), &live, "default", ChangeMeta::now())
        .await
        .unwrap();

    let receipt = engine
        .save_changes(&live, &GraphIndex::new(), "default", ChangeMeta::now())
        .await
        .unwrap();
    assert_eq!(receipt.deleted_subjects, vec![uri("c")]);
    assert!(receipt.updated_subjects.is_empty());

    // The document survives as a tombstone with an advanced version.
    let doc = store.get("main__people", "ex:c|default").await.unwrap().unwrap();
    assert_eq!(doc["_version"], 1);
    let current = engine.get_resource(&uri("c"), "default").await.unwrap().unwrap();
    assert!(current.is_empty());
}

#[tokio::test]
async fn test_concurrent_writers_serialize_on_locks() {
    let store = MemoryDocStore::new();
    let engine = Arc::new(engine(store.clone()));

    // Both writers touch the same subject from an empty before-snapshot;
    // whoever loses the lock race applies second and sees the winner's
    // committed state in its locked snapshot.
    let first = {
        let engine = engine.clone();
        let after = graph(&[("p", "givenName", Value::literal("Ada"))]);
        tokio::spawn(async move {
            engine
                .save_changes(&GraphIndex::new(), &after, "default", ChangeMeta::now())
                .await
        })
    };
    let second = {
        let engine = engine.clone();
        let after = graph(&[("p", "familyName", Value::literal("Lovelace"))]);
        tokio::spawn(async move {
            engine
                .save_changes(&GraphIndex::new(), &after, "default", ChangeMeta::now())
                .await
        })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let doc = store.get("main__people", "ex:p|default").await.unwrap().unwrap();
    assert_eq!(doc["_version"], 1);
    let current = engine.get_resource(&uri("p"), "default").await.unwrap().unwrap();
    assert!(current.contains(&uri("p"), &uri("givenName"), &Value::literal("Ada")));
    assert!(current.contains(&uri("p"), &uri("familyName"), &Value::literal("Lovelace")));
    assert_eq!(store.count("main__people_locks"), 0);
    assert_eq!(
        engine
            .transaction_log()
            .get_completed_transactions(None, None, None, None)
            .await
            .unwrap()
            .len(),
        2
    );
}

/// Composite standing in for a view generator: regenerates whatever subject
/// changed and records each call.
#[derive(Debug)]
struct EchoComposite {
    kind: ArtifactKind,
    types: Vec<String>,
    resolver: Arc<NamespaceTable>,
    calls: Arc<Mutex<Vec<(ResourceKey, bool)>>>,
}

impl EchoComposite {
    fn new(kind: ArtifactKind, types: &[&str]) -> Self {
        Self {
            kind,
            types: types.iter().map(|t| uri(t)).collect(),
            resolver: resolver(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Composite for EchoComposite {
    fn kind(&self) -> ArtifactKind {
        self.kind
    }

    fn types_of_interest(&self) -> &[String] {
        &self.types
    }

    async fn find_indirectly_impacted(
        &self,
        resources_and_predicates: &ResourcesAndPredicates,
        context: &str,
    ) -> heron_db_dispatch::Result<Vec<ResourceKey>> {
        // Behave like an artifact listing its own subject in its impact
        // index, so deletions still reach the regenerator.
        let mut keys = Vec::new();
        for subject in resources_and_predicates.keys() {
            keys.push(ResourceKey::new(
                self.resolver.uri_to_alias(subject)?,
                context,
            ));
        }
        Ok(keys)
    }

    async fn regenerate(
        &self,
        resource: &ResourceKey,
        _spec_types: &[String],
        is_deleted: bool,
    ) -> heron_db_dispatch::Result<()> {
        self.calls.lock().push((resource.clone(), is_deleted));
        Ok(())
    }
}

#[tokio::test]
async fn test_committed_save_drives_dispatch() {
    let store = MemoryDocStore::new();
    let composite = Arc::new(EchoComposite::new(ArtifactKind::View, &["Person"]));
    let dispatcher = Dispatcher::new(
        Arc::new(store.clone()),
        resolver(),
        Arc::new(config()),
        vec![composite.clone()],
        Arc::new(MemoryJobQueue::new()),
    );
    let engine = engine(store.clone()).with_dispatcher(dispatcher);

    let mut person = graph(&[("p", "givenName", Value::literal("Ada"))]);
    person.add(uri("p"), vocab::rdf::TYPE, Value::uri(uri("Person")));
    engine
        .save_changes(&GraphIndex::new(), &person, "default", ChangeMeta::now())
        .await
        .unwrap();
    assert_eq!(
        composite.calls.lock().clone(),
        vec![(ResourceKey::new("ex:p", "default"), false)]
    );

    // Deleting the subject reaches the composite with the delete flag set.
    engine
        .save_changes(&person, &GraphIndex::new(), "default", ChangeMeta::now())
        .await
        .unwrap();
    assert_eq!(
        composite.calls.lock().last().cloned(),
        Some((ResourceKey::new("ex:p", "default"), true))
    );
}

#[tokio::test]
async fn test_first_commit_enqueues_create_then_update() {
    let store = MemoryDocStore::new();
    let composite = Arc::new(EchoComposite::new(ArtifactKind::Search, &["Person"]));
    let queue = MemoryJobQueue::new();
    let dispatcher = Dispatcher::new(
        Arc::new(store.clone()),
        resolver(),
        Arc::new(config()),
        vec![composite],
        Arc::new(queue.clone()),
    );
    let engine = engine(store.clone()).with_dispatcher(dispatcher);

    let mut person = GraphIndex::new();
    person.add(uri("p"), vocab::rdf::TYPE, Value::uri(uri("Person")));
    engine
        .save_changes(&GraphIndex::new(), &person, "default", ChangeMeta::now())
        .await
        .unwrap();

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 1);
    let msg: heron_db_dispatch::ImpactedSubject =
        serde_json::from_value(jobs[0].payload.clone()).unwrap();
    assert!(msg.operation_types.contains(&OperationType::Create));
    assert!(!msg.operation_types.contains(&OperationType::Update));

    // A second save on the now-live subject reports an update.
    let mut renamed = person.clone();
    renamed.add(uri("p"), uri("givenName"), Value::literal("Ada"));
    engine
        .save_changes(&person, &renamed, "default", ChangeMeta::now())
        .await
        .unwrap();
    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 2);
    let msg: heron_db_dispatch::ImpactedSubject =
        serde_json::from_value(jobs[1].payload.clone()).unwrap();
    assert!(msg.operation_types.contains(&OperationType::Update));
    assert!(!msg.operation_types.contains(&OperationType::Create));
}

#[tokio::test]
async fn test_dispatch_failure_never_fails_the_save() {
    #[derive(Debug)]
    struct RefusingComposite {
        types: Vec<String>,
    }

    #[async_trait]
    impl Composite for RefusingComposite {
        fn kind(&self) -> ArtifactKind {
            ArtifactKind::View
        }
        fn types_of_interest(&self) -> &[String] {
            &self.types
        }
        async fn find_indirectly_impacted(
            &self,
            _resources_and_predicates: &ResourcesAndPredicates,
            _context: &str,
        ) -> heron_db_dispatch::Result<Vec<ResourceKey>> {
            Err(heron_db_dispatch::DispatchError::composite("scan refused"))
        }
        async fn regenerate(
            &self,
            _resource: &ResourceKey,
            _spec_types: &[String],
            _is_deleted: bool,
        ) -> heron_db_dispatch::Result<()> {
            Err(heron_db_dispatch::DispatchError::composite("refused"))
        }
    }

    let store = MemoryDocStore::new();
    let dispatcher = Dispatcher::new(
        Arc::new(store.clone()),
        resolver(),
        Arc::new(config()),
        vec![Arc::new(RefusingComposite {
            types: vec![uri("Person")],
        })],
        Arc::new(MemoryJobQueue::new()),
    );
    let engine = engine(store.clone()).with_dispatcher(dispatcher);

    let mut person = GraphIndex::new();
    person.add(uri("p"), vocab::rdf::TYPE, Value::uri(uri("Person")));
    let receipt = engine
        .save_changes(&GraphIndex::new(), &person, "default", ChangeMeta::now())
        .await
        .unwrap();
    assert!(!receipt.is_no_op());
    let doc = store.get("main__people", "ex:p|default").await.unwrap().unwrap();
    assert_eq!(doc["_version"], 0);
}
