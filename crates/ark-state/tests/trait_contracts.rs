//! Trait contract tests for ResourceStore.
//!
//! Every check is a generic function run against both the in-memory store and
//! the SurrealDB store (`mem://`). Any conforming implementation must pass.

use std::time::Duration;

use ark_state::{
    Agent, AgentPhase, AgentTool, Model, ObjectKey, Resource, ResourceKind, ResourceStore,
    StoreError, Tool, WatchEvent, WatchEventType, WatchStream,
};
use futures::StreamExt;

fn key(namespace: &str, name: &str) -> ObjectKey {
    ObjectKey::new(namespace, name)
}

async fn create_then_get_round_trips<S: ResourceStore>(store: S) {
    let agent = Agent::new("default", "helper")
        .with_model("gpt")
        .with_tool(AgentTool::custom("search"));
    let created = store.create(agent.clone().into()).await.unwrap();

    let meta = created.metadata();
    assert!(meta.uid.is_some());
    assert!(meta.created_at.is_some());
    assert!(meta.resource_version > 0);

    let fetched = store.get_agent(&key("default", "helper")).await.unwrap();
    assert_eq!(fetched.spec, agent.spec);
    assert_eq!(fetched.phase(), AgentPhase::Unset);
    assert_eq!(fetched.metadata.resource_version, meta.resource_version);
}

async fn get_missing_is_not_found<S: ResourceStore>(store: S) {
    let err = store
        .get(ResourceKind::Tool, &key("default", "missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { kind: ResourceKind::Tool, .. }));
}

async fn duplicate_create_is_rejected<S: ResourceStore>(store: S) {
    store
        .create(Tool::new("default", "search").into())
        .await
        .unwrap();
    let err = store
        .create(Tool::new("default", "search").into())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

async fn racing_creates_admit_exactly_one<S: ResourceStore>(store: S) {
    for round in 0..10 {
        let name = format!("race-{round}");
        let (first, second) = tokio::join!(
            store.create(Tool::new("default", &name).into()),
            store.create(Tool::new("default", &name).into()),
        );

        let (created, rejected): (Vec<_>, Vec<_>) =
            [first, second].into_iter().partition(Result::is_ok);
        assert_eq!(created.len(), 1, "round {round}");
        let err = rejected.into_iter().next().unwrap().unwrap_err();
        assert!(
            matches!(err, StoreError::AlreadyExists { .. }),
            "round {round}: {err:?}"
        );
    }
    assert_eq!(store.list(ResourceKind::Tool, "default").await.unwrap().len(), 10);
}

async fn same_name_different_kind_coexist<S: ResourceStore>(store: S) {
    store.create(Tool::new("default", "x").into()).await.unwrap();
    store.create(Model::new("default", "x").into()).await.unwrap();

    assert!(store.get(ResourceKind::Tool, &key("default", "x")).await.is_ok());
    assert!(store.get(ResourceKind::Model, &key("default", "x")).await.is_ok());
    assert!(store.get(ResourceKind::Agent, &key("default", "x")).await.is_err());
}

async fn list_is_namespace_scoped_and_ordered<S: ResourceStore>(store: S) {
    for (ns, name) in [("a", "zeta"), ("a", "alpha"), ("b", "alpha")] {
        store.create(Agent::new(ns, name).into()).await.unwrap();
    }
    store.create(Tool::new("a", "tool").into()).await.unwrap();

    let agents = store.list_agents("a").await.unwrap();
    let names: Vec<_> = agents.iter().map(|a| a.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);

    let all = store.list_all(ResourceKind::Agent).await.unwrap();
    let keys: Vec<_> = all.iter().map(|r| r.key().to_string()).collect();
    assert_eq!(keys, vec!["a/alpha", "a/zeta", "b/alpha"]);

    assert!(store.list_agents("empty").await.unwrap().is_empty());
}

async fn update_status_bumps_version_and_keeps_spec<S: ResourceStore>(store: S) {
    let created = store
        .create(Agent::new("default", "helper").with_model("gpt").into())
        .await
        .unwrap()
        .into_agent()
        .unwrap();

    let mut next = created.clone();
    next.status.phase = AgentPhase::Pending;
    next.spec.model_ref = None;
    let written = store.update_status(&next).await.unwrap();

    assert_eq!(written.phase(), AgentPhase::Pending);
    assert!(written.metadata.resource_version > created.metadata.resource_version);
    assert_eq!(written.spec, created.spec, "status write must not touch spec");

    let fetched = store.get_agent(&created.key()).await.unwrap();
    assert_eq!(fetched.phase(), AgentPhase::Pending);
}

async fn stale_status_write_conflicts<S: ResourceStore>(store: S) {
    let created = store
        .create(Agent::new("default", "helper").into())
        .await
        .unwrap()
        .into_agent()
        .unwrap();

    let mut first = created.clone();
    first.status.phase = AgentPhase::Pending;
    store.update_status(&first).await.unwrap();

    let mut stale = created;
    stale.status.phase = AgentPhase::Running;
    let err = store.update_status(&stale).await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");

    let fetched = store.get_agent(&key("default", "helper")).await.unwrap();
    assert_eq!(fetched.phase(), AgentPhase::Pending);
}

async fn status_write_to_deleted_agent_is_not_found<S: ResourceStore>(store: S) {
    let created = store
        .create(Agent::new("default", "gone").into())
        .await
        .unwrap()
        .into_agent()
        .unwrap();
    store
        .delete(ResourceKind::Agent, &created.key())
        .await
        .unwrap();

    let err = store.update_status(&created).await.unwrap_err();
    assert!(err.is_not_found());
}

async fn spec_update_preserves_status<S: ResourceStore>(store: S) {
    let created = store
        .create(Agent::new("default", "helper").into())
        .await
        .unwrap()
        .into_agent()
        .unwrap();
    let mut with_status = created.clone();
    with_status.status.phase = AgentPhase::Running;
    let written = store.update_status(&with_status).await.unwrap();

    let mut edited = written.clone();
    edited.spec.tools.push(AgentTool::custom("search"));
    edited.status.phase = AgentPhase::Unset;
    let updated = store.update(edited.into()).await.unwrap().into_agent().unwrap();

    assert_eq!(updated.phase(), AgentPhase::Running);
    assert_eq!(updated.spec.tools.len(), 1);
    assert_eq!(updated.metadata.uid, created.metadata.uid);
}

async fn delete_missing_is_not_found<S: ResourceStore>(store: S) {
    let err = store
        .delete(ResourceKind::Tool, &key("default", "nope"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

async fn next_event(stream: &mut WatchStream) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("watch event within timeout")
        .expect("stream open")
}

async fn watch_reports_changes_of_its_kind<S: ResourceStore>(store: S) {
    let mut tools = store.watch(ResourceKind::Tool);

    store.create(Agent::new("default", "a").into()).await.unwrap();
    store.create(Tool::new("default", "t").into()).await.unwrap();
    store
        .delete(ResourceKind::Tool, &key("default", "t"))
        .await
        .unwrap();

    let created = next_event(&mut tools).await;
    assert_eq!(created.event_type, WatchEventType::Created);
    assert!(matches!(created.resource, Resource::Tool(_)));

    let deleted = next_event(&mut tools).await;
    assert_eq!(deleted.event_type, WatchEventType::Deleted);
    assert_eq!(deleted.resource.key(), key("default", "t"));
}

macro_rules! contract_tests {
    ($module:ident, $store:expr) => {
        mod $module {
            use super::*;

            #[tokio::test]
            async fn create_then_get() {
                create_then_get_round_trips($store).await;
            }

            #[tokio::test]
            async fn get_missing() {
                get_missing_is_not_found($store).await;
            }

            #[tokio::test]
            async fn duplicate_create() {
                duplicate_create_is_rejected($store).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
            async fn racing_creates() {
                racing_creates_admit_exactly_one($store).await;
            }

            #[tokio::test]
            async fn kinds_are_separate() {
                same_name_different_kind_coexist($store).await;
            }

            #[tokio::test]
            async fn list_scoping() {
                list_is_namespace_scoped_and_ordered($store).await;
            }

            #[tokio::test]
            async fn status_write() {
                update_status_bumps_version_and_keeps_spec($store).await;
            }

            #[tokio::test]
            async fn status_conflict() {
                stale_status_write_conflicts($store).await;
            }

            #[tokio::test]
            async fn status_after_delete() {
                status_write_to_deleted_agent_is_not_found($store).await;
            }

            #[tokio::test]
            async fn spec_update() {
                spec_update_preserves_status($store).await;
            }

            #[tokio::test]
            async fn delete_missing() {
                delete_missing_is_not_found($store).await;
            }

            #[tokio::test]
            async fn watch() {
                watch_reports_changes_of_its_kind($store).await;
            }
        }
    };
}

contract_tests!(memory_store, ark_state::MemoryResourceStore::new());
contract_tests!(
    surreal_store,
    ark_state::SurrealResourceStore::in_memory()
        .await
        .expect("in_memory() failed")
);

// ===========================================================================
// MemoryResourceStore test hooks
// ===========================================================================

#[tokio::test]
async fn memory_store_injected_get_failure_is_unavailable() {
    let store = ark_state::MemoryResourceStore::new();
    store.create(Tool::new("default", "t").into()).await.unwrap();
    store.fail_gets(ResourceKind::Tool, &key("default", "t"), "connection reset");

    let err = store
        .get(ResourceKind::Tool, &key("default", "t"))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::Unavailable("connection reset".into()));

    store.clear_faults();
    assert!(store.get(ResourceKind::Tool, &key("default", "t")).await.is_ok());
}

#[tokio::test]
async fn memory_store_counts_status_writes() {
    let store = ark_state::MemoryResourceStore::new();
    let agent = store
        .create(Agent::new("default", "a").into())
        .await
        .unwrap()
        .into_agent()
        .unwrap();
    assert_eq!(store.status_writes(), 0);

    let mut next = agent;
    next.status.phase = AgentPhase::Pending;
    store.update_status(&next).await.unwrap();
    assert_eq!(store.status_writes(), 1);

    store.conflict_status_updates(&next.key());
    assert!(store.update_status(&next).await.unwrap_err().is_conflict());
    assert_eq!(store.status_writes(), 1);
}
