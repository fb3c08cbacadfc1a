//! SurrealDB-backed ResourceStore implementation
//!
//! Each resource is one row of the `resources` table; the full resource is
//! kept in `body` and the identity columns are duplicated for indexing.
//! Conditional `UPDATE … WHERE resource_version = $expected` statements give
//! optimistic concurrency on spec and status writes.
//!
//! Watch events are published for writes made through this handle only.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::events::EventBroadcaster;
use crate::handle::ConnectTarget;
use crate::migrations;
use crate::resource::{Agent, ObjectKey, Resource, ResourceKind, WatchEvent, WatchEventType};
use crate::storage_traits::{ResourceStore, StorageResult, WatchStream};

/// Row layout of the `resources` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResourceRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<surrealdb::sql::Thing>,
    kind: String,
    namespace: String,
    name: String,
    resource_version: u64,
    body: serde_json::Value,
}

impl ResourceRow {
    fn from_resource(resource: &Resource) -> StorageResult<Self> {
        let meta = resource.metadata();
        Ok(Self {
            id: None,
            kind: resource.kind().as_str().to_string(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            resource_version: meta.resource_version,
            body: serde_json::to_value(resource)?,
        })
    }

    fn into_resource(self) -> StorageResult<Resource> {
        let mut resource: Resource = serde_json::from_value(self.body)?;
        resource.metadata_mut().resource_version = self.resource_version;
        Ok(resource)
    }
}

/// SurrealDB-backed implementation of [`ResourceStore`].
pub struct SurrealResourceStore {
    db: Surreal<Any>,
    events: EventBroadcaster,
}

impl SurrealResourceStore {
    /// Create an in-memory instance (`mem://`), mainly for tests.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = ConnectTarget::Memory.connect().await?;
        let store = Self::with_connection(db).await?;
        info!("SurrealResourceStore connected (in-memory)");
        Ok(store)
    }

    /// Create from environment variables, see [`ConnectTarget::from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        let target = ConnectTarget::from_env()?;
        info!(target = ?target, "SurrealResourceStore connecting");
        let db = target.connect().await?;
        Self::with_connection(db).await
    }

    /// Wrap an existing connection, initializing the schema.
    pub async fn with_connection(db: Surreal<Any>) -> crate::Result<Self> {
        migrations::init_schema(&db).await?;
        Ok(Self {
            db,
            events: EventBroadcaster::default(),
        })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_row(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> StorageResult<Option<ResourceRow>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM resources WHERE kind = $kind AND namespace = $namespace AND name = $name",
            )
            .bind(("kind", kind.as_str().to_string()))
            .bind(("namespace", key.namespace.clone()))
            .bind(("name", key.name.clone()))
            .await?;

        let rows: Vec<ResourceRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_existing(&self, kind: ResourceKind, key: &ObjectKey) -> StorageResult<Resource> {
        self.fetch_row(kind, key)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?
            .into_resource()
    }

    /// Replace the row for `resource` if its stored version is still `expected`.
    async fn replace_if_version(
        &self,
        mut resource: Resource,
        expected: u64,
    ) -> StorageResult<Resource> {
        let kind = resource.kind();
        let key = resource.key();
        resource.metadata_mut().resource_version = expected + 1;
        let row = ResourceRow::from_resource(&resource)?;

        let mut res = self
            .db
            .query(
                "UPDATE resources SET body = $body, resource_version = $next \
                 WHERE kind = $kind AND namespace = $namespace AND name = $name \
                 AND resource_version = $expected",
            )
            .bind(("body", row.body))
            .bind(("next", row.resource_version))
            .bind(("kind", row.kind))
            .bind(("namespace", row.namespace))
            .bind(("name", row.name))
            .bind(("expected", expected))
            .await?;

        let updated: Vec<ResourceRow> = res.take(0)?;
        match updated.into_iter().next() {
            Some(row) => row.into_resource(),
            None => match self.fetch_row(kind, &key).await? {
                None => Err(StoreError::NotFound { kind, key }),
                Some(current) => Err(StoreError::Conflict {
                    kind,
                    key,
                    expected,
                    actual: current.resource_version,
                }),
            },
        }
    }

    async fn select_rows(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> StorageResult<Vec<Resource>> {
        let rows: Vec<ResourceRow> = if let Some(namespace) = namespace {
            let mut res = self
                .db
                .query(
                    "SELECT * FROM resources WHERE kind = $kind AND namespace = $namespace \
                     ORDER BY name ASC",
                )
                .bind(("kind", kind.as_str().to_string()))
                .bind(("namespace", namespace.to_string()))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query(
                    "SELECT * FROM resources WHERE kind = $kind ORDER BY namespace ASC, name ASC",
                )
                .bind(("kind", kind.as_str().to_string()))
                .await?;
            res.take(0)?
        };

        rows.into_iter().map(ResourceRow::into_resource).collect()
    }
}

#[async_trait]
impl ResourceStore for SurrealResourceStore {
    async fn get(&self, kind: ResourceKind, key: &ObjectKey) -> StorageResult<Resource> {
        self.fetch_existing(kind, key).await
    }

    async fn list(&self, kind: ResourceKind, namespace: &str) -> StorageResult<Vec<Resource>> {
        self.select_rows(kind, Some(namespace)).await
    }

    async fn list_all(&self, kind: ResourceKind) -> StorageResult<Vec<Resource>> {
        self.select_rows(kind, None).await
    }

    async fn create(&self, mut resource: Resource) -> StorageResult<Resource> {
        let kind = resource.kind();
        let key = resource.key();

        if self.fetch_row(kind, &key).await?.is_some() {
            return Err(StoreError::AlreadyExists { kind, key });
        }

        let meta = resource.metadata_mut();
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = 1;
        meta.created_at = Some(Utc::now());

        debug!(kind = %kind, key = %key, "creating resource");

        // A racing create can pass the lookup above; the identity index
        // still rejects the second row.
        let row = ResourceRow::from_resource(&resource)?;
        let created: Result<Option<ResourceRow>, surrealdb::Error> =
            self.db.create("resources").content(row).await;
        match created {
            Ok(_) => {}
            Err(err) if is_identity_violation(&err.to_string()) => {
                return Err(StoreError::AlreadyExists { kind, key });
            }
            Err(err) => return Err(err.into()),
        }

        self.events
            .publish(WatchEvent::new(WatchEventType::Created, resource.clone()));
        Ok(resource)
    }

    async fn update(&self, mut resource: Resource) -> StorageResult<Resource> {
        let kind = resource.kind();
        let key = resource.key();
        let stored = self.fetch_existing(kind, &key).await?;

        if let (Resource::Agent(incoming), Resource::Agent(existing)) = (&mut resource, &stored) {
            incoming.status = existing.status.clone();
        }
        let meta = resource.metadata_mut();
        meta.uid = stored.metadata().uid.clone();
        meta.created_at = stored.metadata().created_at;
        let expected = meta.resource_version;

        let updated = self.replace_if_version(resource, expected).await?;
        self.events
            .publish(WatchEvent::new(WatchEventType::Updated, updated.clone()));
        Ok(updated)
    }

    async fn update_status(&self, agent: &Agent) -> StorageResult<Agent> {
        let key = agent.key();
        let stored = match self.fetch_existing(ResourceKind::Agent, &key).await? {
            Resource::Agent(stored) => stored,
            other => {
                return Err(StoreError::KindMismatch {
                    expected: ResourceKind::Agent,
                    actual: other.kind(),
                })
            }
        };

        let mut next = stored;
        next.status = agent.status.clone();
        let expected = agent.metadata.resource_version;

        let updated = self
            .replace_if_version(Resource::Agent(next), expected)
            .await?;
        self.events
            .publish(WatchEvent::new(WatchEventType::Updated, updated.clone()));

        let actual = updated.kind();
        updated.into_agent().ok_or(StoreError::KindMismatch {
            expected: ResourceKind::Agent,
            actual,
        })
    }

    async fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> StorageResult<()> {
        let mut res = self
            .db
            .query(
                "DELETE resources WHERE kind = $kind AND namespace = $namespace AND name = $name \
                 RETURN BEFORE",
            )
            .bind(("kind", kind.as_str().to_string()))
            .bind(("namespace", key.namespace.clone()))
            .bind(("name", key.name.clone()))
            .await?;

        let removed: Vec<ResourceRow> = res.take(0)?;
        let row = removed
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?;

        self.events
            .publish(WatchEvent::new(WatchEventType::Deleted, row.into_resource()?));
        Ok(())
    }

    fn watch(&self, kind: ResourceKind) -> WatchStream {
        self.events.subscribe(kind)
    }
}

/// Whether a SurrealDB error message reports a duplicate on the
/// `(kind, namespace, name)` unique index.
fn is_identity_violation(message: &str) -> bool {
    message.contains("idx_resource_identity") && message.contains("already contains")
}
