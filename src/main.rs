use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use marketplace_sync::config::{self, SyncConfig};
use marketplace_sync::host::{CachedHost, GitHubClient, HostMetrics, SqliteResponseCache};
use marketplace_sync::registry::{PackageFeed, PackagistClient};
use marketplace_sync::store::SqliteRecordStore;
use marketplace_sync::sync::{Importer, TracingNotifier};

#[derive(Parser)]
#[command(name = "marketplace-sync")]
#[command(version, about = "Reconcile Packagist and GitHub package metadata into a local record tree")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import every package of the configured type, then prune removed ones
    Import {
        #[command(flatten)]
        common: CommonArgs,

        /// Keep packages and vendors that are no longer listed
        #[arg(long)]
        no_cleanup: bool,
    },
    /// Import a single package
    Package {
        /// Full package name, e.g. `acme/widgets`
        name: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Reconcile packages even if they look up to date
    #[arg(long)]
    force: bool,

    /// JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs as JSON lines
    #[arg(long)]
    json: bool,
}

fn init_logging(json: bool) -> anyhow::Result<WorkerGuard> {
    let log_dir = config::log_path();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;

    let appender = tracing_appender::rolling::daily(&log_dir, "marketplace-sync.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(guard)
}

fn open_importer(config: &SyncConfig) -> anyhow::Result<Importer<SqliteRecordStore>> {
    std::fs::create_dir_all(config::data_dir())?;

    let store = Arc::new(SqliteRecordStore::new(&config::db_path())?);
    let cache = Arc::new(SqliteResponseCache::new(
        &config::cache_db_path(),
        config.cache.ttl,
    )?);
    cache.purge_expired()?;

    let github: Arc<dyn HostMetrics> = Arc::new(GitHubClient::new(
        &config.github.base_url,
        config.github.token.clone(),
    ));
    let host = Arc::new(CachedHost::new(github, cache));
    let notifier = Arc::new(TracingNotifier);

    Ok(
        Importer::new(store, host, notifier.clone(), notifier)
            .with_fetch_concurrency(config.import.fetch_concurrency),
    )
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Import { common, no_cleanup } => {
            let config = SyncConfig::load(common.config.as_deref())?;
            let feed = PackagistClient::new(&config.packagist.base_url, &config.packagist.package_type);
            let mut importer = open_importer(&config)?;
            importer.force_updates(common.force);

            let summary = importer.run(&feed, !no_cleanup).await?;
            println!(
                "{} packages imported, {} failed, {} packages and {} vendors removed",
                summary.processed, summary.failed, summary.packages_removed, summary.vendors_removed
            );
        }
        Command::Package { name, common } => {
            let config = SyncConfig::load(common.config.as_deref())?;
            let feed = PackagistClient::new(&config.packagist.base_url, &config.packagist.package_type);
            let mut importer = open_importer(&config)?;
            importer.force_updates(common.force);

            let package = feed.fetch_package(&name).await?;
            let record = importer.process(&package).await?;
            info!("Package {} stored as record {}", name, record.id);
            println!("{} imported", name);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let json = match &cli.command {
        Command::Import { common, .. } | Command::Package { common, .. } => common.json,
    };
    let _guard = init_logging(json)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command))
}
