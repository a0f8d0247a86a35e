//! Problem tracker server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use problem_hub::api::{self, AppState};
use problem_hub_core::{
    accounts::Accounts,
    config::HubConfig,
    events::EventBus,
    model::{now, Role},
    scheduler::{self, Job, Maintenance, Schedule},
    storage::JsonStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "problem-hub")]
#[command(about = "Personal problem tracker with sharing, groups and scheduled backups")]
struct Cli {
    /// JSON config file; `PROBLEM_HUB_*` variables and flags override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the JSON collections
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory receiving backup snapshots
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the daily jobs
    Serve {
        /// Listen address
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Take one backup and prune old ones
    Backup,

    /// Grant the admin role to an existing user
    Promote { username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = Arc::new(JsonStore::new(&config.data_dir)?);

    match cli.command {
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.listen_addr.clone());
            serve(store, &config, &addr).await?;
        }
        Commands::Backup => {
            let maintenance = Maintenance::from_config(store, &config, EventBus::new());
            let report = maintenance.run(Job::Backup).await?;
            info!(?report, "backup finished");
        }
        Commands::Promote { username } => {
            Accounts::new(store).set_role(&username, Role::Admin)?;
            info!(%username, "granted admin role");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<HubConfig> {
    let mut config = match &cli.config {
        Some(path) => HubConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HubConfig::default(),
    };
    config.apply_vars(|key| std::env::var(key).ok())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.backup_dir {
        config.backup_dir = dir.clone();
    }
    Ok(config)
}

async fn serve(store: Arc<JsonStore>, config: &HubConfig, addr: &str) -> Result<()> {
    if config.uses_dev_secret() {
        warn!("PROBLEM_HUB_TOKEN_SECRET is not set, tokens are signed with the development secret");
    }

    let state = AppState::new(store, config, EventBus::new());
    let schedule = Schedule::from_config(config, now());
    for job in schedule.jobs() {
        info!(job = %job.job, next_run = %job.next_run, "scheduled");
    }
    let jobs = scheduler::spawn(
        state.maintenance.clone(),
        schedule,
        Duration::from_secs(config.poll_interval_secs.max(1)),
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    jobs.shutdown();
    Ok(())
}
