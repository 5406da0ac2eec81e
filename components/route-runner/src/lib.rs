//! Route configuration resolver and runner.
//!
//! Routes are assembled from three pluggable pieces (a reader, a writer and an
//! optional controller) loaded dynamically from configuration, then drained by
//! the pipeline engine.

pub mod builtins;
pub mod cli;
pub mod helpers;
pub mod instrumentation;
pub mod loader;
pub mod pipeline;
pub mod resolver;
pub mod runtime;
