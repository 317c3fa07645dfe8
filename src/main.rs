//! CLI entry point for feedsync.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use feedsync_core::download::{CONNECT_TIMEOUT_SECS, FetcherConfig};
use feedsync_core::manifest::Manifest;
use feedsync_core::{
    Catalog, DownloadEngine, HttpFetcher, IntegrityPolicy, RetryPolicy, collect_inventory,
    log_inventory, write_manifest,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

use cli::Args;

/// Installs the stderr subscriber and, when requested, a plain-text file layer.
///
/// Priority for the level: `RUST_LOG` > `--quiet` > `--verbose` > info.
fn init_tracing(args: &Args) -> Result<()> {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("tracing subscriber already installed")?;
    Ok(())
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(path) => {
            let catalog = Catalog::load(path)
                .with_context(|| format!("cannot load catalog {}", path.display()))?;
            info!(path = %path.display(), entries = catalog.len(), "catalog loaded");
            Ok(catalog)
        }
        None => {
            let catalog = Catalog::builtin();
            debug!(entries = catalog.len(), "using built-in catalog");
            Ok(catalog)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args)?;

    debug!(?args, "CLI arguments parsed");
    info!(version = env!("CARGO_PKG_VERSION"), "feedsync starting");

    let catalog = load_catalog(args.catalog.as_deref())?;

    let fetcher = HttpFetcher::new(&FetcherConfig {
        connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        attempt_timeout: Duration::from_secs(args.timeout),
        ..FetcherConfig::default()
    })
    .context("cannot build HTTP client")?;

    let engine = DownloadEngine::new(
        usize::from(args.concurrency),
        RetryPolicy::with_max_attempts(u32::from(args.max_attempts)),
        IntegrityPolicy::new(args.min_size),
        Arc::new(fetcher),
    )?;

    let summary = engine.run(&catalog, &args.output_dir).await?;

    for result in summary.results() {
        if let Some(reason) = result.failure() {
            error!(name = %result.name(), attempts = result.attempts_used(), reason = %reason, "failed");
        }
    }

    let inventory = collect_inventory(&catalog, &args.output_dir).await;
    log_inventory(&inventory);

    if !args.no_manifest {
        let manifest = Manifest::build(
            &inventory,
            chrono::Utc::now(),
            chrono::Duration::hours(i64::from(args.refresh_hours)),
        );
        write_manifest(&args.output_dir, &manifest)
            .await
            .context("cannot write manifest")?;
    }

    info!(
        succeeded = summary.succeeded(),
        total = summary.total(),
        "feedsync finished"
    );

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
