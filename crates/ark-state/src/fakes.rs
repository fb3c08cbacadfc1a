//! In-memory resource store
//!
//! `MemoryResourceStore` satisfies the `ResourceStore` contract without any
//! external dependencies. Besides local runs it doubles as a test fixture:
//! failures can be injected per key or namespace, and status writes and
//! lookups are counted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::events::EventBroadcaster;
use crate::resource::{Agent, ObjectKey, Resource, ResourceKind, WatchEvent, WatchEventType};
use crate::storage_traits::{ResourceStore, StorageResult, WatchStream};

type StoreKey = (ResourceKind, ObjectKey);

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<StoreKey, Resource>,
    revision: u64,
}

impl MemoryState {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

#[derive(Debug, Default)]
struct Faults {
    gets: HashMap<StoreKey, String>,
    lists: HashMap<(ResourceKind, String), String>,
    list_alls: HashMap<ResourceKind, String>,
    status_conflicts: HashSet<ObjectKey>,
}

/// In-memory resource store backed by a `BTreeMap<(kind, key), resource>`.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    state: Mutex<MemoryState>,
    faults: Mutex<Faults>,
    events: EventBroadcaster,
    status_writes: AtomicU64,
    gets: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get` of `(kind, key)` fail with `Unavailable(message)`.
    pub fn fail_gets(&self, kind: ResourceKind, key: &ObjectKey, message: impl Into<String>) {
        lock(&self.faults)
            .gets
            .insert((kind, key.clone()), message.into());
    }

    /// Make every `list` of `kind` in `namespace` fail with `Unavailable(message)`.
    pub fn fail_lists(&self, kind: ResourceKind, namespace: &str, message: impl Into<String>) {
        lock(&self.faults)
            .lists
            .insert((kind, namespace.to_string()), message.into());
    }

    /// Make every cross-namespace `list_all` of `kind` fail with `Unavailable(message)`.
    pub fn fail_list_all(&self, kind: ResourceKind, message: impl Into<String>) {
        lock(&self.faults).list_alls.insert(kind, message.into());
    }

    /// Make every status write to `key` fail with `Conflict`.
    pub fn conflict_status_updates(&self, key: &ObjectKey) {
        lock(&self.faults).status_conflicts.insert(key.clone());
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults) = Faults::default();
    }

    /// Number of successful `update_status` calls so far.
    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Number of `get` calls so far, including failed ones.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    fn check_version(
        kind: ResourceKind,
        key: &ObjectKey,
        expected: u64,
        stored: &Resource,
    ) -> StorageResult<()> {
        let actual = stored.metadata().resource_version;
        if expected != actual {
            return Err(StoreError::Conflict {
                kind,
                key: key.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> StorageResult<Resource> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.faults).gets.get(&(kind, key.clone())) {
            return Err(StoreError::Unavailable(message.clone()));
        }

        let state = lock(&self.state);
        state
            .objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })
    }

    async fn list(&self, kind: ResourceKind, namespace: &str) -> StorageResult<Vec<Resource>> {
        if let Some(message) = lock(&self.faults).lists.get(&(kind, namespace.to_string())) {
            return Err(StoreError::Unavailable(message.clone()));
        }

        let state = lock(&self.state);
        Ok(state
            .objects
            .iter()
            .filter(|((k, key), _)| *k == kind && key.namespace == namespace)
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    async fn list_all(&self, kind: ResourceKind) -> StorageResult<Vec<Resource>> {
        if let Some(message) = lock(&self.faults).list_alls.get(&kind) {
            return Err(StoreError::Unavailable(message.clone()));
        }

        let state = lock(&self.state);
        Ok(state
            .objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    async fn create(&self, mut resource: Resource) -> StorageResult<Resource> {
        let kind = resource.kind();
        let key = resource.key();

        let created = {
            let mut state = lock(&self.state);
            if state.objects.contains_key(&(kind, key.clone())) {
                return Err(StoreError::AlreadyExists { kind, key });
            }
            let revision = state.next_revision();
            let meta = resource.metadata_mut();
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
            meta.resource_version = revision;
            meta.created_at = Some(Utc::now());
            state.objects.insert((kind, key), resource.clone());
            resource
        };

        self.events
            .publish(WatchEvent::new(WatchEventType::Created, created.clone()));
        Ok(created)
    }

    async fn update(&self, mut resource: Resource) -> StorageResult<Resource> {
        let kind = resource.kind();
        let key = resource.key();

        let updated = {
            let mut state = lock(&self.state);
            let stored = state
                .objects
                .get(&(kind, key.clone()))
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    kind,
                    key: key.clone(),
                })?;
            Self::check_version(kind, &key, resource.metadata().resource_version, &stored)?;

            if let (Resource::Agent(incoming), Resource::Agent(existing)) = (&mut resource, &stored)
            {
                incoming.status = existing.status.clone();
            }
            let revision = state.next_revision();
            let meta = resource.metadata_mut();
            meta.uid = stored.metadata().uid.clone();
            meta.created_at = stored.metadata().created_at;
            meta.resource_version = revision;
            state.objects.insert((kind, key), resource.clone());
            resource
        };

        self.events
            .publish(WatchEvent::new(WatchEventType::Updated, updated.clone()));
        Ok(updated)
    }

    async fn update_status(&self, agent: &Agent) -> StorageResult<Agent> {
        let kind = ResourceKind::Agent;
        let key = agent.key();

        if lock(&self.faults).status_conflicts.contains(&key) {
            return Err(StoreError::Conflict {
                kind,
                key,
                expected: agent.metadata.resource_version,
                actual: agent.metadata.resource_version + 1,
            });
        }

        let updated = {
            let mut state = lock(&self.state);
            let stored = state
                .objects
                .get(&(kind, key.clone()))
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    kind,
                    key: key.clone(),
                })?;
            Self::check_version(kind, &key, agent.metadata.resource_version, &stored)?;

            let mut stored_agent = match stored {
                Resource::Agent(agent) => agent,
                other => {
                    return Err(StoreError::KindMismatch {
                        expected: kind,
                        actual: other.kind(),
                    })
                }
            };
            stored_agent.status = agent.status.clone();
            stored_agent.metadata.resource_version = state.next_revision();
            state
                .objects
                .insert((kind, key), Resource::Agent(stored_agent.clone()));
            stored_agent
        };

        self.status_writes.fetch_add(1, Ordering::SeqCst);
        self.events.publish(WatchEvent::new(
            WatchEventType::Updated,
            Resource::Agent(updated.clone()),
        ));
        Ok(updated)
    }

    async fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> StorageResult<()> {
        let removed = lock(&self.state)
            .objects
            .remove(&(kind, key.clone()))
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?;

        self.events
            .publish(WatchEvent::new(WatchEventType::Deleted, removed));
        Ok(())
    }

    fn watch(&self, kind: ResourceKind) -> WatchStream {
        self.events.subscribe(kind)
    }
}
