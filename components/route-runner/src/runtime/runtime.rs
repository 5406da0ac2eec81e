// Local crates
use crate::{
    builtins,
    helpers::load_config::Settings,
    loader::{RegistryLoader, ScriptEngine},
    pipeline::{RunSummary, run_routes},
    resolver::{ResolveError, Route, RouteResolver},
};

// External crates
use anyhow::Result;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Where route configuration comes from.
#[derive(Debug, Clone)]
pub enum RouteSource {
    /// YAML or JSON configuration file.
    File(PathBuf),
    /// A single route object assembled from CLI flags.
    Flags(JsonValue),
}

/// Resolver with the built-in packages and the Rhai engine, rooted at the
/// configured base directory.
pub fn build_resolver(settings: &Settings) -> Result<RouteResolver<RegistryLoader>> {
    let base_dir = settings.base_dir()?;
    let scripts = ScriptEngine::new();
    let loader = RegistryLoader::new(base_dir, builtins::registry(), scripts.clone());

    tracing::debug!(base_dir = %loader.base_dir().display(), "Route resolver initialized");
    Ok(RouteResolver::new(loader, Arc::new(scripts)))
}

pub async fn prepare_routes(
    resolver: &RouteResolver<RegistryLoader>,
    source: &RouteSource,
) -> Result<Vec<Route>, ResolveError> {
    match source {
        RouteSource::File(path) => resolver.routes_from_file(path).await,
        RouteSource::Flags(route) => resolver.routes_from_args(route).await,
    }
}

/// Resolves every route and drains them through the pipeline engine.
/// Ctrl-C stops the run between records.
#[instrument(name = "ves_route_run", target = "runtime", level = "debug", skip_all)]
pub async fn run_route_runner(settings: &Settings, source: RouteSource) -> Result<RunSummary> {
    let resolver = build_resolver(settings)?;
    let routes = prepare_routes(&resolver, &source).await?;

    let global_cancel_token = CancellationToken::new();
    let signal_token = global_cancel_token.clone();
    let signal_task = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current record");
            signal_token.cancel();
        }
    });

    let summary = run_routes(routes, &global_cancel_token).await;
    signal_task.abort();
    summary
}

/// Resolves every route without running it. Returns how many resolved.
#[instrument(name = "ves_route_validate", target = "runtime", level = "debug", skip_all)]
pub async fn validate_routes(settings: &Settings, source: RouteSource) -> Result<usize> {
    let resolver = build_resolver(settings)?;
    let routes = prepare_routes(&resolver, &source).await?;
    Ok(routes.len())
}
