//! Phase evaluation
//!
//! Derives an agent's phase from the current existence of its dependencies.
//! Reads only; writing the result is the reconciler's job.

use std::sync::Arc;

use ark_state::{Agent, AgentPhase, ResourceStore, StoreError};
use tracing::instrument;

use crate::dependencies::{dependencies, DependencyRef};
use crate::obs;

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Every dependency exists (or there are none).
    Running,
    /// `missing` does not exist; later dependencies were not checked.
    Pending { missing: DependencyRef },
    /// Looking up `dependency` failed for a reason other than not-found.
    Unknown {
        dependency: DependencyRef,
        error: StoreError,
    },
}

impl Evaluation {
    pub fn phase(&self) -> AgentPhase {
        match self {
            Evaluation::Running => AgentPhase::Running,
            Evaluation::Pending { .. } => AgentPhase::Pending,
            Evaluation::Unknown { .. } => AgentPhase::Unknown,
        }
    }

    /// The lookup failure behind an `Unknown` outcome.
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            Evaluation::Unknown { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Checks an agent's dependencies against a [`ResourceStore`].
pub struct PhaseEvaluator<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for PhaseEvaluator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ResourceStore + ?Sized> PhaseEvaluator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Compute the phase `agent` should have given the current store state.
    ///
    /// The model is checked first, then custom tools in declared order; the
    /// first missing or failing lookup decides the outcome.
    #[instrument(skip_all, fields(agent = %agent.key()), level = "debug")]
    pub async fn evaluate(&self, agent: &Agent) -> Evaluation {
        let key = agent.key();

        for dependency in dependencies(agent) {
            match self.store.get(dependency.kind, &dependency.key).await {
                Ok(_) => continue,
                Err(err) if err.is_not_found() => {
                    obs::emit_dependency_missing(&key, &dependency);
                    return Evaluation::Pending {
                        missing: dependency,
                    };
                }
                Err(error) => {
                    obs::emit_dependency_error(&key, &dependency, &error);
                    return Evaluation::Unknown { dependency, error };
                }
            }
        }

        Evaluation::Running
    }
}
