//! Ark agent dependency controller
//!
//! Keeps every agent's `status.phase` in line with the existence of the
//! tools and models it references:
//! - [`dependencies`] extracts what an agent needs
//! - [`PhaseEvaluator`] checks it against the store
//! - [`WatchRouter`] finds the agents touched by a tool or model change
//! - [`AgentReconciler`] writes the phase back
//! - [`Controller`] drives all of it from watch events

pub mod config;
pub mod controller;
pub mod dependencies;
mod error;
pub mod evaluator;
pub mod obs;
pub mod queue;
pub mod reconciler;
pub mod router;
pub mod telemetry;
pub mod watch;

pub use config::ControllerConfig;
pub use controller::{agent_keys, Controller};
pub use dependencies::{dependencies, depends_on, DependencyRef};
pub use error::{ConfigError, ReconcileError};
pub use evaluator::{Evaluation, PhaseEvaluator};
pub use obs::{
    emit_agent_deleted, emit_agent_triggered, emit_dependency_error, emit_dependency_missing,
    emit_phase_changed, emit_reconcile_failed, emit_router_list_failed, ReconcileSpan,
};
pub use queue::{Backoff, WorkQueue};
pub use reconciler::{Action, AgentReconciler};
pub use router::WatchRouter;
pub use telemetry::init_tracing;
pub use watch::{DependencyMapper, Mapper, Registration, SelfMapper, WatchRegistry};

/// Crate version, reported by the daemon at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
