//! HBS - Holiday Booking Sync
//!
//! Synchronizes remote booking backup artifacts to local storage over FTP,
//! then ingests their XML payloads into the relational store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hbs_common::config::AppConfig;
use hbs_common::logging::{init_logging, LogConfig, LogLevel};
use hbs_db::{DbGateway, PgDriver};
use hbs_ingest::IngestEngine;
use hbs_sync::{pool, FtpTransferClient, SyncEngine, SyncReport, SyncStats};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hbs")]
#[command(author, version, about = "Holiday booking sync and ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize remote backup artifacts to the local directory
    Sync,

    /// Synchronize, then ingest every materialized file
    Run {
        /// Maximum number of files ingested concurrently
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
}

/// Counters for a full sync-and-ingest run, printed as JSON
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    sync: SyncStats,
    ingested_new: usize,
    ingested_existing: usize,
    ingest_failed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    init_logging(&log_config)?;

    let config = AppConfig::from_env()?;

    match cli.command {
        Command::Sync => {
            let report = synchronize(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report.stats)?);
        },
        Command::Run { workers } => {
            let report = synchronize(&config).await?;
            let summary = ingest_all(&config, report, workers).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        },
    }

    Ok(())
}

async fn synchronize(config: &AppConfig) -> Result<SyncReport> {
    std::fs::create_dir_all(&config.local_dir)
        .with_context(|| format!("Failed to create {}", config.local_dir.display()))?;

    let client = FtpTransferClient::new(config.ftp.clone());
    let mut engine = SyncEngine::new(
        client,
        &config.ftp.file_extension,
        Duration::from_secs(config.ftp.timeout_secs),
    );

    let report = engine
        .synchronize(&config.ftp.remote_dir, &config.local_dir)
        .await?;
    Ok(report)
}

async fn ingest_all(config: &AppConfig, report: SyncReport, workers: usize) -> Result<RunSummary> {
    let gateway = Arc::new(DbGateway::new(Arc::new(PgDriver)));
    gateway.connect(&config.db).await?;
    let engine = Arc::new(IngestEngine::new(gateway));

    info!("Ingesting {} file(s)", report.files.len());
    let outcomes = pool::run_bounded(workers, report.files, |path| {
        let engine = Arc::clone(&engine);
        async move { ingest_one(&engine, path).await }
    })
    .await;

    let mut summary = RunSummary {
        sync: report.stats,
        ..RunSummary::default()
    };
    for outcome in outcomes {
        match outcome {
            Some(true) => summary.ingested_new += 1,
            Some(false) => summary.ingested_existing += 1,
            None => summary.ingest_failed += 1,
        }
    }

    info!(
        "Ingestion complete: {} new, {} existing, {} failed",
        summary.ingested_new, summary.ingested_existing, summary.ingest_failed
    );
    Ok(summary)
}

/// Ingest one file; `None` means the file could not be read or ingested
async fn ingest_one(engine: &IngestEngine, path: PathBuf) -> Option<bool> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let xml = match tokio::fs::read_to_string(&path).await {
        Ok(xml) => xml,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return None;
        },
    };

    // A false result covers both "already known" and "failed"; the engine
    // logs the difference. Distinguish the read failure here only.
    Some(engine.ingest(&xml, &name).await)
}
