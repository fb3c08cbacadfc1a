//! Watch registrations
//!
//! The controller watches one stream per registered kind and turns each
//! event into the agent keys to reconcile through that kind's [`Mapper`].

use std::sync::Arc;

use ark_state::{ObjectKey, ResourceKind, ResourceStore, WatchEvent};
use async_trait::async_trait;

use crate::router::WatchRouter;

/// Maps one watch event to the agents it affects.
#[async_trait]
pub trait Mapper: Send + Sync {
    async fn map(&self, event: &WatchEvent) -> Vec<ObjectKey>;
}

/// Agent events reconcile the agent itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfMapper;

#[async_trait]
impl Mapper for SelfMapper {
    async fn map(&self, event: &WatchEvent) -> Vec<ObjectKey> {
        vec![event.resource.key()]
    }
}

/// Tool and model events reconcile every agent that references them.
pub struct DependencyMapper<S: ?Sized> {
    router: WatchRouter<S>,
}

impl<S: ResourceStore + ?Sized> DependencyMapper<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            router: WatchRouter::new(store),
        }
    }
}

#[async_trait]
impl<S: ResourceStore + ?Sized> Mapper for DependencyMapper<S> {
    async fn map(&self, event: &WatchEvent) -> Vec<ObjectKey> {
        self.router
            .affected_agents(event.kind(), &event.resource.key())
            .await
    }
}

/// One watched kind and how its events map to agents.
#[derive(Clone)]
pub struct Registration {
    pub kind: ResourceKind,
    pub mapper: Arc<dyn Mapper>,
}

/// Explicit list of what the controller watches.
#[derive(Clone, Default)]
pub struct WatchRegistry {
    registrations: Vec<Registration>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ResourceKind, mapper: Arc<dyn Mapper>) -> Self {
        self.registrations.push(Registration { kind, mapper });
        self
    }

    /// Agents map to themselves; tools and models go through the router.
    pub fn for_agents<S: ResourceStore + ?Sized + 'static>(store: Arc<S>) -> Self {
        let dependencies: Arc<dyn Mapper> = Arc::new(DependencyMapper::new(store));
        Self::new()
            .register(ResourceKind::Agent, Arc::new(SelfMapper))
            .register(ResourceKind::Tool, Arc::clone(&dependencies))
            .register(ResourceKind::Model, dependencies)
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.registrations.iter().map(|r| r.kind).collect()
    }
}
