//! SurrealDB connection handling
//!
//! [`ConnectTarget::from_env`] picks where the store lives:
//! - `SURREALDB_ENDPOINT` with `SURREALDB_USERNAME` and `SURREALDB_PASSWORD`:
//!   an authenticated endpoint
//! - `SURREALDB_URL`: an unauthenticated URL (`ws://…`, `surrealkv://…`)
//! - nothing: an in-memory engine (`mem://`)
//!
//! An endpoint without complete credentials is a configuration error rather
//! than a silent fallback to another target.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::Result;

const DEFAULT_NAMESPACE: &str = "ark";
const DEFAULT_DATABASE: &str = "controller";
const MEMORY_URL: &str = "mem://";

pub const ENV_ENDPOINT: &str = "SURREALDB_ENDPOINT";
pub const ENV_USERNAME: &str = "SURREALDB_USERNAME";
pub const ENV_PASSWORD: &str = "SURREALDB_PASSWORD";
pub const ENV_NAMESPACE: &str = "SURREALDB_NAMESPACE";
pub const ENV_DATABASE: &str = "SURREALDB_DATABASE";
pub const ENV_ROOT: &str = "SURREALDB_ROOT";
pub const ENV_URL: &str = "SURREALDB_URL";

/// Sign-in details for an authenticated endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Sign in as a root user instead of a database user.
    pub root: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Where the resource store connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Authenticated(Credentials),
    Url(String),
    Memory,
}

impl ConnectTarget {
    /// Resolve the target from `SURREALDB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`ConnectTarget::from_env`] but reading variables through
    /// `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(endpoint) = var(ENV_ENDPOINT) {
            let required = |name: &'static str| {
                var(name).ok_or_else(|| {
                    StateError::Connection(format!("{ENV_ENDPOINT} is set but {name} is not"))
                })
            };
            return Ok(Self::Authenticated(Credentials {
                endpoint,
                username: required(ENV_USERNAME)?,
                password: required(ENV_PASSWORD)?,
                namespace: var(ENV_NAMESPACE).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                database: var(ENV_DATABASE).unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
                root: var(ENV_ROOT).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1"),
            }));
        }

        Ok(match var(ENV_URL) {
            Some(url) => Self::Url(url),
            None => Self::Memory,
        })
    }

    pub async fn connect(&self) -> Result<Surreal<Any>> {
        match self {
            Self::Authenticated(credentials) => connect_authenticated(credentials).await,
            Self::Url(url) => connect_url(url).await,
            Self::Memory => connect_url(MEMORY_URL).await,
        }
    }
}

/// Connect with credentials and select the configured namespace/database.
#[instrument(skip_all, fields(endpoint = %credentials.endpoint, namespace = %credentials.namespace, database = %credentials.database))]
async fn connect_authenticated(credentials: &Credentials) -> Result<Surreal<Any>> {
    info!(root = credentials.root, "connecting to SurrealDB");

    let db = surrealdb::engine::any::connect(&credentials.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", credentials.endpoint, e))
        })?;

    let signed_in = if credentials.root {
        db.signin(Root {
            username: &credentials.username,
            password: &credentials.password,
        })
        .await
    } else {
        db.signin(Database {
            namespace: &credentials.namespace,
            database: &credentials.database,
            username: &credentials.username,
            password: &credentials.password,
        })
        .await
    };
    signed_in.map_err(|e| StateError::Connection(format!("Authentication failed: {}", e)))?;

    db.use_ns(&credentials.namespace)
        .use_db(&credentials.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    Ok(db)
}

/// Connect to an unauthenticated URL (`mem://`, `ws://…`, `surrealkv://…`).
#[instrument]
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    Ok(db)
}
