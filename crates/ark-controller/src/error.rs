//! Controller error taxonomy.

use ark_state::{ObjectKey, StoreError};

use crate::dependencies::DependencyRef;

/// Errors returned by one reconciliation. Every variant is retried by the
/// controller with backoff; none is fatal.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("fetching agent failed: {0}")]
    Fetch(#[source] StoreError),

    #[error("writing status of agent {key} failed: {source}")]
    StatusWrite {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error("checking dependency {dependency} failed: {source}")]
    Dependency {
        dependency: DependencyRef,
        #[source]
        source: StoreError,
    },

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Optimistic-concurrency failure on the status write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::StatusWrite { source, .. } if source.is_conflict())
    }
}

/// Invalid controller configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("workers must be at least 1")]
    NoWorkers,

    #[error("backoff base {base:?} exceeds backoff max {max:?}")]
    BackoffRange {
        base: std::time::Duration,
        max: std::time::Duration,
    },
}
