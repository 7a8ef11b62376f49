//! MWT Ingest - inbox watcher and loader for microwave transport exports

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mwt_common::logging::{init_logging, LogConfig, LogLevel};
use mwt_ingest::{
    aggregate::{AggregateOutcome, Aggregator, PgAggregator},
    archive::DedupArchive,
    codec,
    config::Config,
    db,
    monitor::{DirectoryMonitor, InboxLayout},
    sink::PgSink,
    transform, IdentityDeriver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mwt-ingest")]
#[command(author, version, about = "Microwave transport export ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Inbox root (overrides MWT_INBOX_DIR)
    #[arg(long, global = true, env = "MWT_INBOX_DIR")]
    inbox: Option<PathBuf>,

    /// PostgreSQL connection string (overrides DATABASE_URL)
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process files already in the inbox, then watch it for new ones
    Watch,

    /// Run a single file through the full pipeline
    Process {
        /// Export file to ingest
        file: PathBuf,
    },

    /// Normalize an export without archiving or loading it
    Convert {
        /// Export file to convert
        file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recompute the hourly and daily aggregate tables
    Aggregate,

    /// Remove a file from the archive so it is processed again when re-dropped
    Forget {
        /// File name as it was dropped into the inbox
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("mwt-ingest")
        .filter_directives("sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _guard = init_logging(&log_config)?;

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(inbox) = cli.inbox {
        config.inbox.root = inbox;
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match cli.command {
        Command::Watch => {
            let monitor = connect_monitor(&config).await?;

            let (stop, shutdown) = watch::channel(false);
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = stop.send(true);
            });

            monitor.run(shutdown).await.context("Directory monitor failed")?;
        },
        Command::Process { file } => {
            let monitor = connect_monitor(&config).await?;
            let outcome = monitor
                .process_file(&file)
                .await
                .with_context(|| format!("Failed to process {}", file.display()))?;
            info!(file = %file.display(), outcome = ?outcome, "Done");
        },
        Command::Convert { file, output } => {
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("File path has no usable file name")?;
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let deriver = IdentityDeriver::from_algorithm(config.inbox.sid_hash);
            let rows = transform::normalize(file_name, &text, &deriver)?;
            let encoded = codec::encode(&rows)?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, encoded)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(file = %file_name, rows = rows.len(), output = %path.display(), "Converted");
                },
                None => print!("{}", encoded),
            }
        },
        Command::Aggregate => {
            let pool = db::create_pool(&config.database).await?;
            match PgAggregator::new(pool).aggregate().await? {
                AggregateOutcome::Refreshed => info!("Aggregates refreshed"),
                AggregateOutcome::SkippedMissingSources => {
                    info!("Aggregates not refreshed, normalized tables missing")
                },
            }
        },
        Command::Forget { name } => {
            let layout = InboxLayout::new(&config.inbox.root);
            let archive = DedupArchive::open(&layout.archive)?;
            if !archive.forget(&name)? {
                anyhow::bail!("{} is not in the archive", name);
            }
        },
    }

    Ok(())
}

async fn connect_monitor(config: &Config) -> Result<DirectoryMonitor> {
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::health_check(&pool).await?;

    let monitor = DirectoryMonitor::new(
        &config.inbox,
        Arc::new(PgSink::new(pool.clone())),
        Arc::new(PgAggregator::new(pool)),
    )?;

    info!(
        inbox = %config.inbox.root.display(),
        raw_extension = %config.inbox.raw_extension,
        sid_hash = %config.inbox.sid_hash,
        "Monitor ready"
    );

    Ok(monitor)
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping after queued files");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping after queued files");
        },
    }
}
