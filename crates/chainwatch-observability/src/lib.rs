//! # chainwatch-observability
//!
//! Structured logging for ChainWatch binaries.
//!
//! Every crate logs through `tracing` macros with structured fields; this
//! crate only decides where those records go. Text output is the default,
//! JSON output suits ELK, Loki or CloudWatch ingestion.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogConfig};
