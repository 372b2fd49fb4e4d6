use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dobie_storage::PgStore;
use dobie_sync::{config::split_zips, SyncConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dobie")]
#[command(about = "Dog adoption listing collector and read API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one search-and-ingest pass.
    Sync(SyncArgs),
    /// Apply database migrations.
    Migrate,
    /// Serve the read API.
    Serve,
    /// Run syncs on the `SYNC_CRON` schedule until Ctrl-C.
    Watch(SyncArgs),
}

/// Overrides for the environment-derived sync settings.
#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Search and select candidates without fetching details or writing.
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    delay_ms: Option<u64>,
    #[arg(long)]
    zip: Option<String>,
    /// Comma-separated zip list; queries the API once per zip.
    #[arg(long)]
    zips: Option<String>,
    #[arg(long)]
    breed: Option<String>,
    #[arg(long)]
    radius: Option<String>,
    #[arg(long)]
    start_index: Option<u32>,
    #[arg(long)]
    search_url: Option<String>,
}

impl SyncArgs {
    fn apply(self, config: &mut SyncConfig) {
        config.dry_run |= self.dry_run;
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.delay_ms = delay_ms;
        }
        if let Some(zip) = self.zip {
            config.query.zip = zip;
        }
        if let Some(zips) = self.zips {
            config.query.zips = split_zips(&zips);
        }
        if let Some(breed) = self.breed {
            config.query.breed = breed;
        }
        if let Some(radius) = self.radius {
            config.query.radius = radius;
        }
        if let Some(start_index) = self.start_index {
            config.query.start_index = start_index;
        }
        if let Some(search_url) = self.search_url {
            config.query.search_url = Some(search_url);
        }
    }
}

fn sync_config(args: SyncArgs) -> SyncConfig {
    let mut config = SyncConfig::from_env();
    args.apply(&mut config);
    config
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli.command.unwrap_or(Commands::Sync(SyncArgs::default()))).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "dobie failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Sync(args) => {
            let summary = dobie_sync::run_sync_once(&sync_config(args)).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let store = PgStore::connect(config.require_database_url()?)
                .await
                .context("connecting to database")?;
            store.migrate().await.context("applying migrations")?;
            store.close().await;
            info!("migrations applied");
        }
        Commands::Serve => dobie_web::serve_from_env().await?,
        Commands::Watch(args) => {
            let config = sync_config(args);
            config.validate()?;
            let sched = dobie_sync::build_scheduler(config.clone()).await?;
            sched.start().await.context("starting scheduler")?;
            info!(cron = %config.sync_cron, "scheduler started; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            let mut sched = sched;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }
    Ok(())
}
