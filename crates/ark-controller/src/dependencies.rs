//! Dependency extraction
//!
//! Maps an agent's declared spec to the resources whose existence gates its
//! readiness. Pure: no I/O, recomputed on every evaluation so the result
//! always matches the current spec.

use ark_state::{Agent, ObjectKey, ResourceKind};

/// One resource an agent requires, resolved to a concrete identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyRef {
    pub kind: ResourceKind,
    pub key: ObjectKey,
}

impl DependencyRef {
    pub fn model(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Model,
            key: ObjectKey::new(namespace, name),
        }
    }

    pub fn tool(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Tool,
            key: ObjectKey::new(namespace, name),
        }
    }
}

impl std::fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// Dependencies of `agent` in check order: the model first (if any), then
/// custom tools in declaration order.
///
/// The model namespace defaults to the agent's own; tools always resolve in
/// the agent's namespace. Tools of any type other than `custom`, and custom
/// entries with an empty name, contribute nothing.
pub fn dependencies(agent: &Agent) -> Vec<DependencyRef> {
    let namespace = &agent.metadata.namespace;
    let mut refs = Vec::with_capacity(agent.spec.tools.len() + 1);

    if let Some(model_ref) = &agent.spec.model_ref {
        let model_namespace = model_ref
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(namespace.as_str());
        refs.push(DependencyRef::model(model_namespace, &model_ref.name));
    }

    refs.extend(
        agent
            .spec
            .tools
            .iter()
            .filter(|tool| tool.is_custom() && !tool.name.is_empty())
            .map(|tool| DependencyRef::tool(namespace.as_str(), &tool.name)),
    );

    refs
}

/// Whether `agent` requires exactly `dependency`: same kind, namespace and
/// name after namespace defaulting.
pub fn depends_on(agent: &Agent, dependency: &DependencyRef) -> bool {
    dependencies(agent).contains(dependency)
}
