//! Controller runtime
//!
//! Wires watch streams, the work queue and the reconciler together:
//! - one pump task per watch registration feeds mapped keys into the queue
//! - `workers` worker tasks drain the queue and reconcile
//! - successful reconciles may ask for a delayed requeue, failures are
//!   retried with per-key backoff

use std::sync::Arc;

use ark_state::{ObjectKey, Resource, ResourceKind, ResourceStore};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::ControllerConfig;
use crate::error::ReconcileError;
use crate::obs::{self, ReconcileSpan};
use crate::queue::WorkQueue;
use crate::reconciler::AgentReconciler;
use crate::watch::{Registration, WatchRegistry};

pub struct Controller<S: ?Sized> {
    store: Arc<S>,
    reconciler: AgentReconciler<S>,
    registry: WatchRegistry,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
}

impl<S: ResourceStore + ?Sized + 'static> Controller<S> {
    /// Controller for agents with the default watch registrations.
    pub fn new(store: Arc<S>, config: ControllerConfig) -> Self {
        let registry = WatchRegistry::for_agents(Arc::clone(&store));
        Self::with_registry(store, config, registry)
    }

    pub fn with_registry(store: Arc<S>, config: ControllerConfig, registry: WatchRegistry) -> Self {
        Self {
            reconciler: AgentReconciler::new(Arc::clone(&store), config.fallback_requeue),
            queue: WorkQueue::new(config.backoff()),
            store,
            registry,
            config,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run until `cancel` fires.
    ///
    /// Watches are opened before the initial listing so no change made
    /// during startup is missed. In-flight reconciliations observe the same
    /// cancellation and stop before their next status write.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            workers = self.config.workers,
            fallback_requeue_secs = self.config.fallback_requeue.as_secs(),
            kinds = ?self.registry.kinds(),
            "controller starting"
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for registration in self.registry.registrations() {
            tasks.push(self.spawn_pump(registration.clone(), cancel.clone()));
        }

        self.initial_sync(&cancel).await;

        for worker in 0..self.config.workers {
            tasks.push(self.spawn_worker(worker, cancel.clone()));
        }

        cancel.cancelled().await;
        info!("controller shutting down");
        self.queue.shutdown();

        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                warn!(error = %err, "controller task ended abnormally");
            }
        }
        info!("controller stopped");
    }

    /// Queue every existing agent, retrying the listing with backoff.
    async fn initial_sync(&self, cancel: &CancellationToken) {
        let backoff = self.config.backoff();
        let mut attempt = 0u32;
        loop {
            match self.store.list_all(ResourceKind::Agent).await {
                Ok(agents) => {
                    debug!(count = agents.len(), "initial agent sync");
                    for agent in agents {
                        self.queue.add(agent.key());
                    }
                    return;
                }
                Err(err) => {
                    let delay = backoff.delay(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(error = %err, attempt, retry_in = ?delay, "initial agent listing failed");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn spawn_pump(&self, registration: Registration, cancel: CancellationToken) -> JoinHandle<()> {
        let mut events = self.store.watch(registration.kind);
        let queue = Arc::clone(&self.queue);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.next() => event,
                };
                let Some(event) = event else {
                    warn!(kind = %registration.kind, "watch stream closed");
                    break;
                };
                debug!(
                    kind = %registration.kind,
                    event = ?event.event_type,
                    resource = %event.resource.key(),
                    "watch event"
                );
                for key in registration.mapper.map(&event).await {
                    queue.add(key);
                }
            }
        })
    }

    fn spawn_worker(&self, worker: usize, cancel: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let reconciler = self.reconciler.clone();

        tokio::spawn(async move {
            while let Some(key) = queue.get().await {
                process(&queue, &reconciler, &key, &cancel)
                    .instrument(ReconcileSpan::span(&key))
                    .await;
                queue.done(&key);
            }
            debug!(worker, "worker stopped");
        })
    }
}

async fn process<S: ResourceStore + ?Sized>(
    queue: &Arc<WorkQueue>,
    reconciler: &AgentReconciler<S>,
    key: &ObjectKey,
    cancel: &CancellationToken,
) {
    let token = cancel.child_token();
    match reconciler.reconcile(key, &token).await {
        Ok(action) => {
            queue.forget(key);
            if let Some(delay) = action.requeue_after {
                queue.add_after(key.clone(), delay);
            }
        }
        Err(ReconcileError::Cancelled) => {
            debug!("reconcile cancelled");
        }
        Err(err) => {
            let attempt = queue.add_rate_limited(key.clone());
            obs::emit_reconcile_failed(key, attempt, &err);
        }
    }
}

/// Keys of the agents in a manifest, in order.
pub fn agent_keys(resources: &[Resource]) -> Vec<ObjectKey> {
    resources
        .iter()
        .filter(|r| r.kind() == ResourceKind::Agent)
        .map(Resource::key)
        .collect()
}
