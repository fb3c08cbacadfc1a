//! SurrealDB schema migrations and initialization
//!
//! Safe to call on every connection (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::Result;

/// Initialize all Ark tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Ark SurrealDB schema");
    init_resources_table(db).await?;
    info!("Ark schema initialization complete");
    Ok(())
}

/// Initialize `resources` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE resources {
///   kind:              STRING (Agent | Tool | Model)
///   namespace:         STRING
///   name:              STRING
///   resource_version:  INT (bumped on every write)
///   body:              OBJECT (the serialized resource)
/// }
/// ```
///
/// Constraints:
/// - `(kind, namespace, name)` is unique
/// - `resource_version` guards conditional updates (enforced via app logic)
async fn init_resources_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing resources table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS resources SCHEMALESS;

        -- One row per resource identity
        DEFINE INDEX IF NOT EXISTS idx_resource_identity ON TABLE resources COLUMNS kind, namespace, name UNIQUE;

        -- Namespace-scoped listing
        DEFINE INDEX IF NOT EXISTS idx_resource_namespace ON TABLE resources COLUMNS kind, namespace;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

    debug!("resources table initialized");
    Ok(())
}
