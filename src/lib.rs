//! Feedsync Core Library
//!
//! This library fetches a catalog of remote playlists and compressed guide
//! feeds over HTTP and materializes them atomically into a local directory,
//! replacing stale copies from earlier runs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - The injected list of (name, URL) resources and URL validation
//! - [`download`] - Fetch, integrity check, retry, commit and the run orchestrator
//! - [`manifest`] - Post-run inventory and the `files_metadata.json` manifest

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod download;
pub mod manifest;
mod user_agent;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError, DownloadTask, ResourceKind, is_valid_url};
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DownloadEngine, DownloadResult, EngineError,
    FailureKind, FailureReason, Fetcher, HttpFetcher, IntegrityPolicy, RetryPolicy, RunSummary,
};
pub use manifest::{Manifest, collect_inventory, log_inventory, write_manifest};
