//! End-to-end controller behaviour against the in-memory store.
//!
//! Each test starts a real [`Controller`] on a background task, mutates the
//! store the way a user would and waits for agent phases to converge.

use std::sync::Arc;
use std::time::Duration;

use ark_controller::{Controller, ControllerConfig};
use ark_state::{
    Agent, AgentPhase, AgentTool, MemoryResourceStore, Model, ObjectKey, Resource, ResourceKind,
    ResourceStore, Tool,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    store: Arc<MemoryResourceStore>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Harness {
    fn start(config: ControllerConfig) -> Self {
        let store = Arc::new(MemoryResourceStore::new());
        Self::start_with(store, config)
    }

    fn start_with(store: Arc<MemoryResourceStore>, config: ControllerConfig) -> Self {
        let cancel = CancellationToken::new();
        let controller = Controller::new(Arc::clone(&store), config);
        let task = tokio::spawn(controller.run(cancel.clone()));
        Self {
            store,
            cancel,
            task,
        }
    }

    async fn create(&self, resource: impl Into<Resource>) {
        self.store.create(resource.into()).await.unwrap();
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) {
        self.store
            .delete(kind, &ObjectKey::new(namespace, name))
            .await
            .unwrap();
    }

    async fn wait_for_phase(&self, namespace: &str, name: &str, phase: AgentPhase) {
        let key = ObjectKey::new(namespace, name);
        let result = tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(agent) = self.store.get_agent(&key).await {
                    if agent.status.phase == phase {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        if result.is_err() {
            let actual = self.store.get_agent(&key).await.map(|a| a.status.phase);
            panic!("{key} did not reach {phase} within {WAIT:?}, last seen {actual:?}");
        }
    }

    async fn phase(&self, namespace: &str, name: &str) -> AgentPhase {
        self.store
            .get_agent(&ObjectKey::new(namespace, name))
            .await
            .unwrap()
            .status
            .phase
    }

    async fn stop(self) {
        self.cancel.cancel();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("controller did not stop")
            .unwrap();
    }
}

fn fast_config() -> ControllerConfig {
    ControllerConfig::default()
        .with_workers(2)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(20))
}

#[tokio::test]
async fn agent_without_dependencies_runs() {
    let harness = Harness::start(fast_config());
    harness.create(Agent::new("default", "bare")).await;

    harness
        .wait_for_phase("default", "bare", AgentPhase::Running)
        .await;
    harness.stop().await;
}

#[tokio::test]
async fn tool_lifecycle_drives_agent_phase() {
    let harness = Harness::start(fast_config());
    harness
        .create(Agent::new("default", "helper").with_tool(AgentTool::custom("T")))
        .await;
    harness
        .wait_for_phase("default", "helper", AgentPhase::Pending)
        .await;

    harness.create(Tool::new("default", "T")).await;
    harness
        .wait_for_phase("default", "helper", AgentPhase::Running)
        .await;

    harness.delete(ResourceKind::Tool, "default", "T").await;
    harness
        .wait_for_phase("default", "helper", AgentPhase::Pending)
        .await;

    harness.stop().await;
}

#[tokio::test]
async fn model_creation_unblocks_agent() {
    let harness = Harness::start(fast_config());
    harness
        .create(Agent::new("team", "writer").with_model_in("shared", "gpt"))
        .await;
    harness
        .wait_for_phase("team", "writer", AgentPhase::Pending)
        .await;

    // Same name in the agent's own namespace does not count.
    harness.create(Model::new("team", "gpt")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.phase("team", "writer").await, AgentPhase::Pending);

    harness.create(Model::new("shared", "gpt")).await;
    harness
        .wait_for_phase("team", "writer", AgentPhase::Running)
        .await;
    harness.stop().await;
}

#[tokio::test]
async fn existing_agents_are_picked_up_at_startup() {
    let store = Arc::new(MemoryResourceStore::new());
    store
        .create(Tool::new("default", "T").into())
        .await
        .unwrap();
    store
        .create(
            Agent::new("default", "ready")
                .with_tool(AgentTool::custom("T"))
                .into(),
        )
        .await
        .unwrap();
    store
        .create(
            Agent::new("default", "blocked")
                .with_tool(AgentTool::custom("missing"))
                .into(),
        )
        .await
        .unwrap();

    let harness = Harness::start_with(store, fast_config());
    harness
        .wait_for_phase("default", "ready", AgentPhase::Running)
        .await;
    harness
        .wait_for_phase("default", "blocked", AgentPhase::Pending)
        .await;
    harness.stop().await;
}

#[tokio::test]
async fn transient_error_isolated_and_retried() {
    let harness = Harness::start(fast_config());
    harness.create(Model::new("default", "other")).await;
    harness
        .store
        .fail_gets(ResourceKind::Model, &ObjectKey::new("default", "gpt"), "timeout");
    harness.create(Model::new("default", "gpt")).await;
    harness
        .create(Agent::new("default", "a").with_model("gpt"))
        .await;
    harness
        .create(Agent::new("default", "b").with_model("other"))
        .await;

    harness
        .wait_for_phase("default", "a", AgentPhase::Unknown)
        .await;
    harness
        .wait_for_phase("default", "b", AgentPhase::Running)
        .await;

    // Backoff retries bring the agent back once the store recovers.
    harness.store.clear_faults();
    harness
        .wait_for_phase("default", "a", AgentPhase::Running)
        .await;
    harness.stop().await;
}

#[tokio::test]
async fn fallback_requeue_covers_missed_dependency_event() {
    let harness = Harness::start(fast_config().with_fallback_requeue(Duration::from_millis(50)));
    harness
        .create(Agent::new("default", "helper").with_tool(AgentTool::custom("T")))
        .await;
    harness
        .wait_for_phase("default", "helper", AgentPhase::Pending)
        .await;

    // The router cannot list agents, so the tool event is dropped.
    harness
        .store
        .fail_lists(ResourceKind::Agent, "default", "list unavailable");
    harness.create(Tool::new("default", "T")).await;
    harness
        .wait_for_phase("default", "helper", AgentPhase::Running)
        .await;
    harness.stop().await;
}

#[tokio::test]
async fn agent_edits_do_not_multiply_fallback_rechecks() {
    let fallback = Duration::from_millis(200);
    let harness = Harness::start(fast_config().with_fallback_requeue(fallback));
    harness
        .create(Agent::new("default", "helper").with_tool(AgentTool::custom("T")))
        .await;
    harness
        .wait_for_phase("default", "helper", AgentPhase::Pending)
        .await;

    let key = ObjectKey::new("default", "helper");
    for _ in 0..10 {
        let agent = harness.store.get_agent(&key).await.unwrap();
        harness.store.update(agent.into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Each re-check reads the agent and its tool: about ten reads per second
    // with a single fallback timer, several times that with one per edit.
    let before = harness.store.gets();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let reads = harness.store.gets() - before;
    assert!(reads <= 16, "{reads} reads in one second");
    assert_eq!(harness.phase("default", "helper").await, AgentPhase::Pending);

    harness.stop().await;
}

#[tokio::test]
async fn converges_after_event_churn() {
    let harness = Harness::start(fast_config());
    for i in 0..5 {
        harness
            .create(
                Agent::new("default", format!("agent-{i}"))
                    .with_model("gpt")
                    .with_tool(AgentTool::custom("T")),
            )
            .await;
    }
    for _ in 0..3 {
        harness.create(Tool::new("default", "T")).await;
        harness.delete(ResourceKind::Tool, "default", "T").await;
    }
    harness.create(Tool::new("default", "T")).await;
    harness.create(Model::new("default", "gpt")).await;

    for i in 0..5 {
        harness
            .wait_for_phase("default", &format!("agent-{i}"), AgentPhase::Running)
            .await;
    }
    harness.stop().await;
}

#[tokio::test]
async fn deleted_agent_is_left_alone() {
    let harness = Harness::start(fast_config());
    harness.create(Agent::new("default", "short-lived")).await;
    harness
        .wait_for_phase("default", "short-lived", AgentPhase::Running)
        .await;

    harness
        .delete(ResourceKind::Agent, "default", "short-lived")
        .await;
    let writes = harness.store.status_writes();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.store.status_writes(), writes);
    harness.stop().await;
}

#[tokio::test]
async fn controller_never_writes_dependencies() {
    let harness = Harness::start(fast_config());
    harness.create(Tool::new("default", "T")).await;
    harness
        .create(Agent::new("default", "helper").with_tool(AgentTool::custom("T")))
        .await;
    harness
        .wait_for_phase("default", "helper", AgentPhase::Running)
        .await;

    let tool = harness
        .store
        .get(ResourceKind::Tool, &ObjectKey::new("default", "T"))
        .await
        .unwrap();
    assert_eq!(tool.metadata().resource_version, 1);
    harness.stop().await;
}
