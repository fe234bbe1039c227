#![deny(unused)]
//! Logging and metrics setup for the playground binary.
//!
//! Library crates only emit `tracing` events and `metrics` samples; this
//! crate installs the subscriber and recorder that consume them.

pub mod metrics;
pub mod tracing_layer;

pub use crate::metrics::{describe_metrics, setup_metrics_recorder};
pub use crate::tracing_layer::{configure_tracing, shutdown_tracing};
