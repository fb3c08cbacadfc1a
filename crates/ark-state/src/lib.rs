//! Ark-State: resource persistence for the Ark agent controller
//!
//! This crate owns everything the controller knows about the platform's
//! resource database:
//!
//! - `resource`: the Agent / Tool / Model model and watch events
//! - `ResourceStore`: the async, watchable store trait the controller consumes
//! - `MemoryResourceStore`: in-memory implementation with fault injection
//! - `SurrealResourceStore`: SurrealDB-backed implementation

mod error;
pub mod events;
pub mod fakes;
pub mod handle;
pub mod migrations;
pub mod resource;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StoreError};
pub use fakes::MemoryResourceStore;
pub use handle::{ConnectTarget, Credentials};
pub use resource::{
    Agent, AgentPhase, AgentSpec, AgentStatus, AgentTool, Model, ModelRef, ModelSpec, ObjectKey,
    ObjectMeta, Resource, ResourceKind, Tool, ToolSpec, WatchEvent, WatchEventType,
    CUSTOM_TOOL_TYPE,
};
pub use storage_traits::{ResourceStore, StorageResult, WatchStream};
pub use surreal_store::SurrealResourceStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
