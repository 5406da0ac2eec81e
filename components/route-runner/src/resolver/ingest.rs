// Local crates
use crate::loader::ModuleLoader;
use crate::resolver::{
    error::ResolveError,
    route::{Route, RouteResolver},
};

// External crates
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::instrument;

/// Reads a YAML or JSON route document and returns its entries in order.
///
/// A top-level list is a list of entries; anything else is one entry.
#[instrument(
    name = "route_runner::read_routes",
    target = "resolver::ingest",
    level = "debug",
    skip_all,
    fields(path = %path.display())
)]
pub async fn read_route_entries(path: &Path) -> Result<Vec<JsonValue>, ResolveError> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|cause| ResolveError::ConfigRead {
            path: path.to_path_buf(),
            cause,
        })?;
    if !exists {
        tracing::error!("Configuration file not found");
        return Err(ResolveError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|cause| ResolveError::ConfigRead {
            path: path.to_path_buf(),
            cause,
        })?;

    // YAML is a superset of JSON, one parser covers both.
    let document: JsonValue = serde_yaml::from_str(&text).map_err(|cause| {
        tracing::error!(error = %cause, "Failed to parse route configuration");
        ResolveError::ConfigParse {
            path: path.to_path_buf(),
            cause,
        }
    })?;

    let entries = match document {
        JsonValue::Array(entries) => entries,
        single => vec![single],
    };

    tracing::debug!(entries = entries.len(), "Route configuration loaded");
    Ok(entries)
}

impl<L: ModuleLoader> RouteResolver<L> {
    /// File mode: every entry of the document, resolved sequentially.
    ///
    /// The first failing entry aborts the whole run.
    pub async fn routes_from_file(&self, path: &Path) -> Result<Vec<Route>, ResolveError> {
        let entries = read_route_entries(path).await?;

        let mut routes = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let route = self.resolve_route(entry).await.map_err(|cause| {
                tracing::error!(route = index, error = %cause, "Route entry failed to resolve");
                ResolveError::Prepare {
                    index,
                    cause: Box::new(cause),
                }
            })?;
            routes.push(route);
        }

        tracing::info!(routes = routes.len(), "Routes prepared from configuration file");
        Ok(routes)
    }

    /// Direct-arguments mode: a single route object assembled from CLI flags.
    pub async fn routes_from_args(&self, route: &JsonValue) -> Result<Vec<Route>, ResolveError> {
        let route = self.resolve_route(route).await?;
        Ok(vec![route])
    }
}
