//! Navigator controller
//!
//! Manages Elasticsearch and Cassandra clusters on Kubernetes.
//!
//! ## Usage
//!
//! ```bash
//! # Run every controller against the current kubeconfig
//! navigator-controller
//!
//! # Only Elasticsearch, in one namespace, with debug logs
//! RUST_LOG=debug navigator-controller --namespace search --controllers elasticsearch,pilot
//! ```

use clap::Parser;
use futures::future::{join_all, select_all};
use kube::Client;
use navigator::config::DEFAULT_CONTROLLERS;
use navigator::events::KubeEventPublisher;
use navigator::state::Caches;
use navigator::telemetry::{self, LogFormat};
use navigator::{Context, OperatorConfig, Registry};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Navigator Kubernetes controller
#[derive(Parser, Debug)]
#[command(name = "navigator-controller")]
#[command(version, about = "Kubernetes controller for Elasticsearch and Cassandra clusters")]
struct Args {
    /// Namespace to watch (empty for all namespaces)
    #[arg(long, env = "NAVIGATOR_NAMESPACE", default_value = "")]
    namespace: String,

    /// Concurrent reconciles per controller
    #[arg(long, env = "NAVIGATOR_WORKERS", default_value_t = 4)]
    workers: u16,

    /// Controllers to run
    #[arg(
        long,
        env = "NAVIGATOR_CONTROLLERS",
        value_delimiter = ',',
        default_values_t = DEFAULT_CONTROLLERS.map(String::from)
    )]
    controllers: Vec<String>,

    /// First retry delay after a failed reconcile, in milliseconds
    #[arg(long, default_value_t = 500)]
    min_backoff_ms: u64,

    /// Retry delay ceiling, in seconds
    #[arg(long, default_value_t = 300)]
    max_backoff_secs: u64,

    /// Requeue interval after a successful reconcile, in seconds
    #[arg(long, default_value_t = 60)]
    resync_secs: u64,

    /// Log output format
    #[arg(long, env = "NAVIGATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

impl Args {
    fn config(&self) -> OperatorConfig {
        OperatorConfig {
            namespace: (!self.namespace.is_empty()).then(|| self.namespace.clone()),
            workers: self.workers.max(1),
            controllers: self.controllers.clone(),
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            resync: Duration::from_secs(self.resync_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(args.log_format)?;
    let config = args.config();

    info!("Starting Navigator controller");
    info!(
        "Watching namespace: {}",
        config.namespace.as_deref().unwrap_or("all")
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let caches = Caches::start(&client, config.namespace.as_deref());
    caches.wait_until_ready().await?;
    info!("Caches synced");

    let recorder = Arc::new(KubeEventPublisher::new(client.clone()));
    let state = caches.state(&client, recorder);
    let controllers = config.controllers.clone();
    let ctx = Arc::new(Context::new(client, state, config));

    let handles = Registry::default().start(&controllers, ctx)?;
    supervise(handles, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    info!("Navigator controller shutting down");
    Ok(())
}

/// Wait for `shutdown` or the first controller to exit, then wait for the
/// rest to finish their in-flight reconciles. A panicked controller aborts
/// the others.
async fn supervise(
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let (mut names, mut tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    anyhow::ensure!(!tasks.is_empty(), "no controllers selected");

    let first = tokio::select! {
        _ = shutdown => None,
        (result, index, _) = select_all(tasks.iter_mut()) => Some((index, result)),
    };

    match first {
        None => info!("Received shutdown signal"),
        Some((index, result)) => {
            let name = names.remove(index);
            tasks.remove(index);
            if let Err(e) = result {
                error!(controller = name, "Controller task failed: {}", e);
                for task in &tasks {
                    task.abort();
                }
                anyhow::bail!("controller {name} failed: {e}");
            }
            info!(controller = name, "Controller stopped");
        }
    }

    info!(remaining = tasks.len(), "Waiting for controllers to stop");
    for (name, result) in names.into_iter().zip(join_all(tasks).await) {
        match result {
            Ok(()) => info!(controller = name, "Controller stopped"),
            Err(e) => error!(controller = name, "Controller task failed: {}", e),
        }
    }
    Ok(())
}
