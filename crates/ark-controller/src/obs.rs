//! Structured observability hooks for the agent controller.
//!
//! This module provides:
//! - Agent-scoped tracing spans via the `ReconcileSpan` RAII guard
//! - Emission functions for the controller's notable events
//!
//! Missing dependencies and deleted agents are expected conditions and are
//! logged at `info!`, never as failures.

use tracing::{debug, info, warn};

use ark_state::{AgentPhase, ObjectKey, ResourceKind};

use crate::dependencies::DependencyRef;

/// RAII guard that enters an agent-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = ReconcileSpan::enter(&key);
/// // every event logged now carries agent = "namespace/name"
/// ```
pub struct ReconcileSpan {
    _span: tracing::span::EnteredSpan,
}

impl ReconcileSpan {
    /// Create and enter a span tagged with the agent key.
    pub fn enter(key: &ObjectKey) -> Self {
        let span = tracing::info_span!("ark.reconcile", agent = %key);
        Self {
            _span: span.entered(),
        }
    }

    /// Build (without entering) the span, for use with `Instrument`.
    pub fn span(key: &ObjectKey) -> tracing::Span {
        tracing::info_span!("ark.reconcile", agent = %key)
    }
}

/// Emit event: agent status phase written.
pub fn emit_phase_changed(key: &ObjectKey, from: AgentPhase, to: AgentPhase) {
    info!(event = "agent.phase_changed", agent = %key, from = %from, to = %to);
}

/// Emit event: a dependency lookup found nothing.
pub fn emit_dependency_missing(key: &ObjectKey, dependency: &DependencyRef) {
    info!(
        event = "agent.dependency_missing",
        agent = %key,
        kind = %dependency.kind,
        dependency = %dependency.key,
    );
}

/// Emit event: a dependency lookup failed for a reason other than not-found.
pub fn emit_dependency_error(
    key: &ObjectKey,
    dependency: &DependencyRef,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "agent.dependency_error",
        agent = %key,
        kind = %dependency.kind,
        dependency = %dependency.key,
        error = %error,
    );
}

/// Emit event: the agent no longer exists, reconciliation is a no-op.
pub fn emit_agent_deleted(key: &ObjectKey) {
    info!(event = "agent.deleted", agent = %key);
}

/// Emit event: listing agents for a dependency change failed.
pub fn emit_router_list_failed(
    kind: ResourceKind,
    changed: &ObjectKey,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "router.list_failed",
        kind = %kind,
        resource = %changed,
        error = %error,
        "failed to list agents for dependency change"
    );
}

/// Emit event: a dependency change triggered re-evaluation of an agent.
pub fn emit_agent_triggered(kind: ResourceKind, changed: &ObjectKey, agent: &ObjectKey) {
    debug!(
        event = "router.agent_triggered",
        kind = %kind,
        resource = %changed,
        agent = %agent,
    );
}

/// Emit event: a reconciliation returned an error and will be retried.
pub fn emit_reconcile_failed(key: &ObjectKey, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "reconcile.failed", agent = %key, attempt, error = %error);
}
