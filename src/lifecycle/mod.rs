//! # Orchestration Controller
//!
//! Drives a run end to end and turns the final state table into a report.
//!
//! - [`Controller`] - resolves the graph, spawns one task per service, waits
//! - [`RunReport`] / [`StatusReport`] - what `run` and `status` print
//! - [`tracing`](self::tracing) - subscriber setup for the binary

pub mod controller;
pub mod error;
pub mod report;
pub mod tracing;

pub use controller::Controller;
pub use error::ControllerError;
pub use report::*;
