//! Agent reconciliation
//!
//! One fetch-evaluate-write cycle for one agent identity. The reconciler
//! only ever writes agent status; tools and models are read, never touched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ark_state::{Agent, AgentPhase, ObjectKey, ResourceStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::ReconcileError;
use crate::evaluator::{Evaluation, PhaseEvaluator};
use crate::obs;

/// What the controller should do with a key after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action {
    /// Re-check after this delay even if no event arrives.
    pub requeue_after: Option<Duration>,
}

impl Action {
    /// Wait for the next watch event.
    pub fn await_change() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Drives one agent's `status.phase` toward the value its dependencies imply.
pub struct AgentReconciler<S: ?Sized> {
    store: Arc<S>,
    evaluator: PhaseEvaluator<S>,
    fallback_requeue: Duration,
}

impl<S: ?Sized> Clone for AgentReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            evaluator: self.evaluator.clone(),
            fallback_requeue: self.fallback_requeue,
        }
    }
}

impl<S: ResourceStore + ?Sized> AgentReconciler<S> {
    pub fn new(store: Arc<S>, fallback_requeue: Duration) -> Self {
        Self {
            evaluator: PhaseEvaluator::new(Arc::clone(&store)),
            store,
            fallback_requeue,
        }
    }

    pub fn fallback_requeue(&self) -> Duration {
        self.fallback_requeue
    }

    /// Reconcile the agent at `key`.
    ///
    /// A deleted agent is a silent success. A pending agent asks for a
    /// fallback re-check. A transient dependency failure records `Unknown`
    /// and is also returned as an error so the caller retries. Once `cancel`
    /// fires no further status write is started.
    #[instrument(skip_all, fields(agent = %key), level = "debug")]
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError> {
        let fetched = cancellable(cancel, self.store.get_agent(key)).await?;
        let mut agent = match fetched {
            Ok(agent) => agent,
            Err(err) if err.is_not_found() => {
                obs::emit_agent_deleted(key);
                return Ok(Action::await_change());
            }
            Err(err) => return Err(ReconcileError::Fetch(err)),
        };

        if agent.status.phase.is_unset() {
            agent = self.write_phase(agent, AgentPhase::Pending, cancel).await?;
        }

        let evaluation = cancellable(cancel, self.evaluator.evaluate(&agent)).await?;
        let phase = evaluation.phase();
        if phase != agent.status.phase {
            self.write_phase(agent, phase, cancel).await?;
        } else {
            debug!(phase = %phase, "phase unchanged, skipping status write");
        }

        match evaluation {
            Evaluation::Running => Ok(Action::await_change()),
            Evaluation::Pending { .. } => Ok(Action::requeue(self.fallback_requeue)),
            Evaluation::Unknown { dependency, error } => Err(ReconcileError::Dependency {
                dependency,
                source: error,
            }),
        }
    }

    async fn write_phase(
        &self,
        mut agent: Agent,
        phase: AgentPhase,
        cancel: &CancellationToken,
    ) -> Result<Agent, ReconcileError> {
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let key = agent.key();
        let from = agent.status.phase;
        agent.status.phase = phase;

        let written = self
            .store
            .update_status(&agent)
            .await
            .map_err(|source: StoreError| ReconcileError::StatusWrite {
                key: key.clone(),
                source,
            })?;
        obs::emit_phase_changed(&key, from, phase);
        Ok(written)
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ReconcileError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        out = fut => Ok(out),
    }
}
