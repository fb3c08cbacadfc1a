//! Storage trait definitions for Ark resources
//!
//! `ResourceStore` is the only seam between the controller and the platform's
//! resource database. It is async and backend-agnostic:
//! - `MemoryResourceStore` (in `fakes`) for tests and local runs
//! - `SurrealResourceStore` for a SurrealDB-backed deployment

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;
use crate::resource::{Agent, ObjectKey, Resource, ResourceKind, WatchEvent};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StoreError>;

/// Stream of committed changes for one resource kind.
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// Watchable, consistent store of namespaced resources.
///
/// Guarantees:
/// - `get` returns `StoreError::NotFound` when the resource does not exist.
/// - `list` / `list_all` results are ordered by namespace, then name.
/// - Every successful write bumps `metadata.resource_version`.
/// - `update` and `update_status` fail with `StoreError::Conflict` when the
///   caller's `resource_version` is stale.
/// - `watch` delivers an event only after the corresponding write commits.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Point lookup of one resource.
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> StorageResult<Resource>;

    /// List every resource of `kind` in `namespace`.
    async fn list(&self, kind: ResourceKind, namespace: &str) -> StorageResult<Vec<Resource>>;

    /// List every resource of `kind` across all namespaces.
    async fn list_all(&self, kind: ResourceKind) -> StorageResult<Vec<Resource>>;

    /// Create a resource. Fails with `AlreadyExists` on a duplicate identity.
    async fn create(&self, resource: Resource) -> StorageResult<Resource>;

    /// Replace a resource's spec. An agent's stored status is preserved.
    async fn update(&self, resource: Resource) -> StorageResult<Resource>;

    /// Replace an agent's status, leaving its spec untouched.
    async fn update_status(&self, agent: &Agent) -> StorageResult<Agent>;

    /// Delete a resource. Fails with `NotFound` when absent.
    async fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> StorageResult<()>;

    /// Subscribe to changes of one kind, starting from now.
    fn watch(&self, kind: ResourceKind) -> WatchStream;

    /// Typed lookup of an agent.
    async fn get_agent(&self, key: &ObjectKey) -> StorageResult<Agent> {
        let resource = self.get(ResourceKind::Agent, key).await?;
        let actual = resource.kind();
        resource.into_agent().ok_or(StoreError::KindMismatch {
            expected: ResourceKind::Agent,
            actual,
        })
    }

    /// Typed listing of the agents in one namespace.
    async fn list_agents(&self, namespace: &str) -> StorageResult<Vec<Agent>> {
        let resources = self.list(ResourceKind::Agent, namespace).await?;
        Ok(resources
            .into_iter()
            .filter_map(Resource::into_agent)
            .collect())
    }

    /// Typed listing of every agent in every namespace.
    async fn list_all_agents(&self) -> StorageResult<Vec<Agent>> {
        let resources = self.list_all(ResourceKind::Agent).await?;
        Ok(resources
            .into_iter()
            .filter_map(Resource::into_agent)
            .collect())
    }
}
