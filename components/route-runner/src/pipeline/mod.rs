//! Default pipeline engine.

pub mod runner;

pub use runner::{RunSummary, run_routes};
