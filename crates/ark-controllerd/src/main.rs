//! Ark agent controller daemon
//!
//! ## Commands
//!
//! - `run`: watch agents, tools and models and keep agent phases current
//!   until interrupted
//! - `check`: load manifests, reconcile every agent once and print phases

mod manifests;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ark_controller::{agent_keys, AgentReconciler, Controller, ControllerConfig, ReconcileError};
use ark_state::{MemoryResourceStore, ResourceStore, SurrealResourceStore};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "ark-controllerd")]
#[command(author = "Ark Contributors")]
#[command(version = ark_controller::VERSION)]
#[command(about = "Derives agent readiness from the tools and models they reference", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller until Ctrl-C
    Run {
        /// Resource store backend
        #[arg(long, value_enum, default_value_t = StoreBackend::Memory, env = "ARK_STORE")]
        store: StoreBackend,

        /// JSON array of resources to apply before starting
        #[arg(short, long)]
        manifests: Option<PathBuf>,

        #[command(flatten)]
        tuning: Tuning,
    },

    /// Reconcile every agent in a manifest once and print its phase
    Check {
        /// JSON array of resources
        #[arg(short, long)]
        manifests: PathBuf,

        /// Only report agents in this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    /// In-process store, lost on exit
    Memory,
    /// SurrealDB, configured through SURREALDB_* variables
    Surreal,
}

/// Command-line overrides layered over `ARK_*` environment configuration.
#[derive(clap::Args, Debug, Default)]
struct Tuning {
    /// Concurrent reconciliations [env: ARK_WORKERS]
    #[arg(long)]
    workers: Option<usize>,

    /// Re-check interval for pending agents, in seconds [env: ARK_FALLBACK_REQUEUE_SECS]
    #[arg(long)]
    fallback_requeue_secs: Option<u64>,

    /// First retry delay after a failed reconcile, in milliseconds [env: ARK_BACKOFF_BASE_MS]
    #[arg(long)]
    backoff_base_ms: Option<u64>,

    /// Longest retry delay, in seconds [env: ARK_BACKOFF_MAX_SECS]
    #[arg(long)]
    backoff_max_secs: Option<u64>,
}

impl Tuning {
    fn into_config(self) -> Result<ControllerConfig> {
        let base = ControllerConfig::from_env().context("Invalid ARK_* environment")?;
        self.apply(base)
    }

    /// `base` with every flag that was given applied on top.
    fn apply(self, mut config: ControllerConfig) -> Result<ControllerConfig> {
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(secs) = self.fallback_requeue_secs {
            config = config.with_fallback_requeue(Duration::from_secs(secs));
        }
        let base = self
            .backoff_base_ms
            .map(Duration::from_millis)
            .unwrap_or(config.backoff_base);
        let max = self
            .backoff_max_secs
            .map(Duration::from_secs)
            .unwrap_or(config.backoff_max);
        config = config.with_backoff(base, max);

        config.validate().context("Invalid controller configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ark_controller::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            store,
            manifests,
            tuning,
        } => cmd_run(store, manifests, tuning.into_config()?).await,
        Commands::Check {
            manifests,
            namespace,
        } => {
            for line in cmd_check(&manifests, namespace.as_deref()).await? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

async fn open_store(backend: StoreBackend) -> Result<Arc<dyn ResourceStore>> {
    let store: Arc<dyn ResourceStore> = match backend {
        StoreBackend::Memory => Arc::new(MemoryResourceStore::new()),
        StoreBackend::Surreal => Arc::new(
            SurrealResourceStore::from_env()
                .await
                .context("Failed to connect to SurrealDB")?,
        ),
    };
    Ok(store)
}

async fn cmd_run(
    backend: StoreBackend,
    manifests: Option<PathBuf>,
    config: ControllerConfig,
) -> Result<()> {
    info!(version = ark_controller::VERSION, store = ?backend, "ark-controllerd starting");

    let store = open_store(backend).await?;
    if let Some(path) = manifests {
        let resources = manifests::load(&path)?;
        manifests::apply(store.as_ref(), resources).await?;
    }

    let cancel = CancellationToken::new();
    let controller = Controller::new(Arc::clone(&store), config);
    let running = tokio::spawn(controller.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("interrupt received");
    cancel.cancel();

    running.await.context("Controller task panicked")?;
    Ok(())
}

/// One `namespace/name phase` line per agent, in manifest order.
async fn cmd_check(path: &Path, namespace: Option<&str>) -> Result<Vec<String>> {
    let resources = manifests::load(path)?;
    let keys = agent_keys(&resources);

    let store = Arc::new(MemoryResourceStore::new());
    manifests::apply(store.as_ref(), resources).await?;

    let reconciler = AgentReconciler::new(
        Arc::clone(&store),
        ControllerConfig::default().fallback_requeue,
    );
    let cancel = CancellationToken::new();

    let mut lines = Vec::new();
    for key in keys {
        if namespace.is_some_and(|ns| ns != key.namespace) {
            continue;
        }
        match reconciler.reconcile(&key, &cancel).await {
            Ok(_) => {}
            Err(err @ ReconcileError::Dependency { .. }) => {
                warn!(agent = %key, error = %err, "dependency check failed");
            }
            Err(err) => return Err(err).with_context(|| format!("Failed to reconcile {key}")),
        }
        let agent = store
            .get_agent(&key)
            .await
            .with_context(|| format!("Agent disappeared: {key}"))?;
        lines.push(format!("{key} {}", agent.status.phase));
    }
    Ok(lines)
}
