//! Resource model for the Ark platform
//!
//! The store holds three kinds of namespaced resources:
//! - `Agent`: the primary resource, whose `status.phase` the controller derives
//! - `Tool`: a platform-managed tool an agent may depend on
//! - `Model`: a model definition an agent may reference
//!
//! Only the existence of a `Tool` or `Model` matters to the controller; their
//! spec bodies are carried so manifests round-trip through the store intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tool type tag for platform-managed tools that must exist as `Tool` resources.
pub const CUSTOM_TOOL_TYPE: &str = "custom";

/// Identity of a namespaced resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Agent,
    Tool,
    Model,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Agent => "Agent",
            ResourceKind::Tool => "Tool",
            ResourceKind::Model => "Model",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Agent" => Ok(ResourceKind::Agent),
            "Tool" => Ok(ResourceKind::Tool),
            "Model" => Ok(ResourceKind::Model),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// Metadata shared by every resource.
///
/// `uid`, `resource_version` and `created_at` are owned by the store: callers
/// leave them at their defaults on create and echo them back on update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Bumped on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Derived readiness of an agent.
///
/// `Unset` only exists before the controller first observes an agent; it
/// serializes as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentPhase {
    #[default]
    #[serde(rename = "")]
    Unset,
    Pending,
    Running,
    Unknown,
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::Unset => "",
            AgentPhase::Pending => "Pending",
            AgentPhase::Running => "Running",
            AgentPhase::Unknown => "Unknown",
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, AgentPhase::Unset)
    }
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentPhase::Unset => f.write_str("<unset>"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Reference from an agent to a `Model`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    /// Defaults to the agent's namespace when absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One entry of an agent's tool list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTool {
    /// Tool type tag, e.g. `custom` or `built-in`.
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(default)]
    pub name: String,
}

impl AgentTool {
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            tool_type: CUSTOM_TOOL_TYPE.to_string(),
            name: name.into(),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.tool_type == CUSTOM_TOOL_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<ModelRef>,
    #[serde(default)]
    pub tools: Vec<AgentTool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentStatus {
    #[serde(default)]
    pub phase: AgentPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AgentSpec,
    #[serde(default)]
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: AgentSpec::default(),
            status: AgentStatus::default(),
        }
    }

    /// Set the model reference (same namespace as the agent).
    pub fn with_model(mut self, name: impl Into<String>) -> Self {
        self.spec.model_ref = Some(ModelRef {
            name: name.into(),
            namespace: None,
        });
        self
    }

    /// Set a model reference into another namespace.
    pub fn with_model_in(mut self, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        self.spec.model_ref = Some(ModelRef {
            name: name.into(),
            namespace: Some(namespace.into()),
        });
        self
    }

    pub fn with_tool(mut self, tool: AgentTool) -> Self {
        self.spec.tools.push(tool);
        self
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn phase(&self) -> AgentPhase {
        self.status.phase
    }
}

// ---------------------------------------------------------------------------
// Tool / Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type", default)]
    pub tool_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ToolSpec,
}

impl Tool {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: ToolSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(rename = "type", default)]
    pub model_type: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ModelSpec,
}

impl Model {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: ModelSpec::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource union and watch events
// ---------------------------------------------------------------------------

/// Any stored resource. Serialized with a `kind` tag so a manifest file can
/// mix kinds in one array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Agent(Agent),
    Tool(Tool),
    Model(Model),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Agent(_) => ResourceKind::Agent,
            Resource::Tool(_) => ResourceKind::Tool,
            Resource::Model(_) => ResourceKind::Model,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Agent(a) => &a.metadata,
            Resource::Tool(t) => &t.metadata,
            Resource::Model(m) => &m.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Resource::Agent(a) => &mut a.metadata,
            Resource::Tool(t) => &mut t.metadata,
            Resource::Model(m) => &mut m.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata().key()
    }

    pub fn into_agent(self) -> Option<Agent> {
        match self {
            Resource::Agent(a) => Some(a),
            _ => None,
        }
    }
}

impl From<Agent> for Resource {
    fn from(agent: Agent) -> Self {
        Resource::Agent(agent)
    }
}

impl From<Tool> for Resource {
    fn from(tool: Tool) -> Self {
        Resource::Tool(tool)
    }
}

impl From<Model> for Resource {
    fn from(model: Model) -> Self {
        Resource::Model(model)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventType {
    Created,
    Updated,
    Deleted,
}

/// A committed change to one resource. For `Deleted`, `resource` is the last
/// stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub resource: Resource,
}

impl WatchEvent {
    pub fn new(event_type: WatchEventType, resource: Resource) -> Self {
        Self {
            event_type,
            resource,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }
}
