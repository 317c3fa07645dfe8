//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use feedsync_core::download::{ATTEMPT_TIMEOUT_SECS, DEFAULT_MIN_SIZE_BYTES};
use feedsync_core::manifest::DEFAULT_REFRESH_HOURS;
use feedsync_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS};

/// Fetch playlist and guide feeds into a directory.
///
/// Every catalog entry is downloaded, checked, and atomically moved into
/// place; files from earlier runs are replaced. The exit status is non-zero
/// when any entry failed.
#[derive(Parser, Debug)]
#[command(name = "feedsync")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory that receives the downloaded files
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// JSON catalog of {"group": {"file": "url"}} (built-in catalog if omitted)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Attempts per file before giving up (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    /// Deadline for one download attempt in seconds (1-3600)
    #[arg(short = 't', long, default_value_t = ATTEMPT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: u64,

    /// Smallest accepted download in bytes (at least 1)
    #[arg(long, default_value_t = DEFAULT_MIN_SIZE_BYTES, value_parser = clap::value_parser!(u64).range(1..))]
    pub min_size: u64,

    /// Do not write files_metadata.json
    #[arg(long)]
    pub no_manifest: bool,

    /// Hours until the next scheduled run, recorded in the manifest (1-168)
    #[arg(long, default_value_t = DEFAULT_REFRESH_HOURS, value_parser = clap::value_parser!(u32).range(1..=168))]
    pub refresh_hours: u32,

    /// Also append log output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
