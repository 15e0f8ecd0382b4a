//! tallyd - UDP telemetry aggregator.
//!
//! tallyd receives counters, gauges and linear histograms over UDP in a
//! line-oriented text protocol, aggregates them in memory and exposes the
//! result for Prometheus scraping.
//!
//! # Features
//!
//! - **Line Protocol**: `name|kind|value` records with shared label scopes
//! - **Non-blocking Ingress**: bounded queue, overflow is rejected and counted
//! - **Single-writer Aggregation**: one worker folds samples in arrival order
//! - **Pluggable Fingerprints**: FNV-1a 64 or truncated SHA-256
//! - **Bounded Shutdown**: queued samples drained within a timeout
//!
//! # Architecture
//!
//! - `protocol`: text line parser
//! - `fingerprint`: series identity
//! - `collector`: ingress queue and aggregation worker
//! - `metrics`: accumulators and their stores
//! - `receiver`: UDP front-end
//! - `export` / `api`: Prometheus exposition and the HTTP endpoint
//! - `core`: configuration, errors and the sample model
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use tallyd_lib::core::Config;
//! use tallyd_lib::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::new(config)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod application;
pub mod cli;
pub mod collector;
pub mod core;
pub mod export;
pub mod fingerprint;
pub mod metrics;
pub mod protocol;
pub mod receiver;

// Re-export core types for convenience
pub use crate::application::Application;
pub use crate::core::{Config, Result};
