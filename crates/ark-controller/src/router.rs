//! Reverse-dependency lookup
//!
//! When a Tool or Model changes, every agent that references it must be
//! re-evaluated. There is no persistent index: the router lists candidate
//! agents and runs the dependency extractor on each, so it can never disagree
//! with the current specs.
//!
//! Tools always resolve in the agent's own namespace, so a Tool change only
//! lists that namespace. A model reference may name another namespace, so a
//! Model change lists agents across all namespaces.

use std::collections::BTreeSet;
use std::sync::Arc;

use ark_state::{ObjectKey, ResourceKind, ResourceStore};
use tracing::instrument;

use crate::dependencies::{depends_on, DependencyRef};
use crate::obs;

/// Maps a changed dependency to the agents that reference it.
pub struct WatchRouter<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for WatchRouter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ResourceStore + ?Sized> WatchRouter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Agents whose resolved dependencies include the `kind` resource at
    /// `changed`.
    ///
    /// Each agent appears at most once, ordered by key. A failed listing is
    /// logged and yields no agents; the pending-agent fallback requeue picks
    /// up anything missed.
    #[instrument(skip_all, fields(kind = %kind, resource = %changed), level = "debug")]
    pub async fn affected_agents(&self, kind: ResourceKind, changed: &ObjectKey) -> Vec<ObjectKey> {
        let listed = match kind {
            ResourceKind::Model => self.store.list_all_agents().await,
            _ => self.store.list_agents(&changed.namespace).await,
        };
        let agents = match listed {
            Ok(agents) => agents,
            Err(error) => {
                obs::emit_router_list_failed(kind, changed, &error);
                return Vec::new();
            }
        };

        let dependency = DependencyRef {
            kind,
            key: changed.clone(),
        };
        let affected: BTreeSet<ObjectKey> = agents
            .iter()
            .filter(|agent| depends_on(agent, &dependency))
            .map(|agent| agent.key())
            .collect();

        for agent in &affected {
            obs::emit_agent_triggered(kind, changed, agent);
        }

        affected.into_iter().collect()
    }
}
