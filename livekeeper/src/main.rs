mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use livekeeper::config::AppConfig;
use livekeeper::logging;
use livekeeper::recording::SessionMap;
use livekeeper::registry::{EntityRegistry, FileRegistryStore, RemoveOutcome};
use livekeeper::services::ServiceContainer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Args, Commands, FlagArg};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Commands::Run => run_daemon(config).await,
        Commands::Add {
            id,
            flags,
            name,
            user_id,
            group_id,
        } => {
            let registry = open_registry(&config).await?;
            let entity = registry
                .add_subscription(id, FlagArg::combine(&flags), cli::targets(user_id, group_id), name)
                .await?;
            println!("{}", serde_json::to_string_pretty(&entity)?);
            Ok(())
        }
        Commands::Remove { id, flags } => {
            let registry = open_registry(&config).await?;
            match registry.remove_subscription(id, FlagArg::combine(&flags)).await? {
                RemoveOutcome::NotFound => anyhow::bail!("{} is not subscribed", id),
                outcome => println!("{}", serde_json::to_string_pretty(&outcome)?),
            }
            Ok(())
        }
        Commands::List => {
            let registry = open_registry(&config).await?;
            println!("{}", serde_json::to_string_pretty(&registry.snapshot().await)?);
            Ok(())
        }
    }
}

/// Console-only logging for one-shot registry commands.
fn init_cli_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "livekeeper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_daemon(config: AppConfig) -> anyhow::Result<()> {
    let (logging, _guard) = logging::init_logging(&config.log_dir)?;
    if let Some(directive) = &config.log_filter {
        logging.set_filter(directive)?;
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        filter = %logging.get_filter(),
        log_dir = %logging.log_dir().display(),
        "livekeeper starting"
    );

    let container = ServiceContainer::from_config(&config)
        .await
        .context("initializing services")?;
    logging.start_retention_cleanup(container.cancellation_token());

    let plane = container.control_plane()?;
    let commands = container.commands();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Ctrl-C received, shutting down");
        let response = commands.quit().await;
        if !response.success {
            warn!(message = %response.message, "Quit not delivered");
        }
    });

    let report = plane.run().await;
    if report.timed_out {
        warn!(?report, "Shutdown exceeded grace period");
    } else {
        info!(?report, "Shutdown complete");
    }
    Ok(())
}

/// Open the registry file for a one-shot edit. A running daemon picks the
/// change up through change polling.
async fn open_registry(config: &AppConfig) -> anyhow::Result<EntityRegistry> {
    init_cli_logging();
    let store = Arc::new(FileRegistryStore::new(config.registry.path.clone())?);
    let registry = EntityRegistry::load(store, Arc::new(SessionMap::new())).await?;
    Ok(registry)
}
