// Local crates
use crate::loader::{
    ExpressionEngine, Function, ImportSpec, ModuleLoader, Reader, Value, Variables, load_module,
};
use crate::resolver::{args::ArgParser, config::RouteConfig, error::ResolveError};

// External crates
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// A fully materialized route, ready for the pipeline engine.
#[derive(Debug)]
pub struct Route {
    pub from: Reader,
    pub to: Function,
    pub controller: Option<BoundController>,
}

/// Controller function with the route's `variables` bound as `this`.
#[derive(Debug, Clone)]
pub struct BoundController {
    function: Function,
    variables: Variables,
}

impl BoundController {
    pub fn new(function: Function, variables: Variables) -> Self {
        Self { function, variables }
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub async fn call(&self, record: Value) -> anyhow::Result<Value> {
        self.function.call(Some(&self.variables), vec![record]).await
    }
}

/// Turns route configuration entries into [`Route`]s.
pub struct RouteResolver<L> {
    loader: L,
    expressions: Arc<dyn ExpressionEngine>,
}

impl<L: ModuleLoader> RouteResolver<L> {
    pub fn new(loader: L, expressions: Arc<dyn ExpressionEngine>) -> Self {
        Self { loader, expressions }
    }

    /// Validates and resolves one raw configuration entry.
    ///
    /// Every shape check runs before the first module load, and the first
    /// failure aborts the whole entry.
    pub async fn resolve_route(&self, raw: &JsonValue) -> Result<Route, ResolveError> {
        let config = RouteConfig::from_value(raw)?;
        self.resolve_config(&config).await
    }

    #[instrument(
        name = "route_runner::resolve_route",
        target = "resolver::route",
        level = "debug",
        skip_all,
        fields(from = %config.from.module, to = %config.to.module)
    )]
    pub async fn resolve_config(&self, config: &RouteConfig) -> Result<Route, ResolveError> {
        let from = self.reader(&config.from).await?;
        let to = self.writer(&config.to).await?;
        let controller = match &config.controller {
            Some(spec) => Some(self.controller(spec, config.variables.clone()).await?),
            None => None,
        };

        tracing::debug!(controller = controller.is_some(), "Route resolved");
        Ok(Route { from, to, controller })
    }

    async fn reader(&self, spec: &ImportSpec) -> Result<Reader, ResolveError> {
        let output = self.construct("from", spec).await?;

        output.into_reader().map_err(|other| {
            tracing::error!(module = %spec.module, kind = other.type_name(), "Reader factory returned a non-iterable");
            ResolveError::contract(
                "from.module",
                format!("'{}' does not provide an iterable or async iterable.", spec.module),
            )
        })
    }

    async fn writer(&self, spec: &ImportSpec) -> Result<Function, ResolveError> {
        match self.construct("to", spec).await? {
            Value::Function(writer) => Ok(writer),
            other => {
                tracing::error!(module = %spec.module, kind = other.type_name(), "Writer factory returned a non-function");
                Err(ResolveError::contract(
                    "to.module",
                    format!(
                        "'{}' does not provide a function after initialization.",
                        spec.module
                    ),
                ))
            }
        }
    }

    async fn controller(&self, spec: &ImportSpec, variables: Variables) -> Result<BoundController, ResolveError> {
        match load_module(&self.loader, spec).await? {
            Value::Function(function) => Ok(BoundController::new(function, variables)),
            _ => Err(ResolveError::contract(
                "controller",
                format!("'{}' does not provide a function.", spec.module),
            )),
        }
    }

    /// Loads a factory, prepares its arguments and invokes it.
    async fn construct(&self, key: &str, spec: &ImportSpec) -> Result<Value, ResolveError> {
        let module_key = format!("{key}.module");

        let factory = match load_module(&self.loader, spec).await? {
            Value::Function(factory) => factory,
            _ => {
                return Err(ResolveError::contract(
                    module_key,
                    format!("'{}' does not export a function.", spec.module),
                ));
            }
        };

        let args = ArgParser::new(&self.loader, self.expressions.as_ref())
            .resolve_args(&format!("{key}.args"), spec.args.as_ref())
            .await?;

        tracing::trace!(key = %key, factory = %factory.name(), args = args.len(), "Invoking factory");
        factory
            .call(None, args)
            .await
            .map_err(|cause| ResolveError::Invocation {
                key: module_key,
                module: spec.module.clone(),
                cause,
            })
    }
}

impl<L: fmt::Debug> fmt::Debug for RouteResolver<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteResolver")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}
