//! Route configuration resolution: guards, argument directives, module
//! loading and configuration ingestion.

pub mod args;
pub mod assert;
pub mod config;
pub mod error;
pub mod ingest;
pub mod route;

pub use args::ArgParser;
pub use config::RouteConfig;
pub use error::ResolveError;
pub use ingest::read_route_entries;
pub use route::{BoundController, Route, RouteResolver};
