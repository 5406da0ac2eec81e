//! Embedded scripting boundary backed by Rhai.
//!
//! Two things go through here:
//! - `$function` argument directives, compiled by [`ExpressionEngine::compile_function`],
//! - `.rhai` script modules, compiled by [`ScriptEngine::load_module`].
//!
//! Every evaluation starts from an empty [`Scope`]: scripts never see host
//! state, only the arguments (and `this`) they are called with. Both script
//! functions and function pointers bind `this` when a context is supplied.

// Local crates
use crate::loader::module::Module;
use crate::loader::value::{Callable, Function, Value, Variables};

// External crates
use anyhow::{Context, anyhow};
use futures::future::{self, BoxFuture, FutureExt};
use rhai::{AST, CallFnOptions, Dynamic, Engine, FnPtr, Scope};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

const MAX_OPERATIONS: u64 = 5_000_000;
const MAX_EXPR_DEPTH: usize = 64;

/// Failure to turn a function literal into a callable.
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("invalid function literal: {0}")]
    Evaluation(String),
    #[error("function literal evaluated to '{0}', expected a function")]
    NotCallable(&'static str),
}

/// Strategy used by the `$function` directive.
pub trait ExpressionEngine: Send + Sync {
    /// Compiles `source` in an isolated scope and returns the callable it
    /// evaluates to.
    fn compile_function(&self, source: &str) -> Result<Function, ExpressionError>;
}

/// Shared Rhai engine.
#[derive(Clone)]
pub struct ScriptEngine {
    engine: Arc<Engine>,
}

impl ScriptEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
        engine.on_print(|text| tracing::info!(target: "script", "{text}"));
        engine.on_debug(|text, source, position| {
            tracing::debug!(target: "script", source = ?source, position = %position, "{text}")
        });

        Self {
            engine: Arc::new(engine),
        }
    }

    /// Compiles and evaluates a script module.
    ///
    /// Every script function becomes a named export. The value of the final
    /// expression, unless it is `()`, becomes the default export.
    #[instrument(
        name = "route_runner::script_module",
        target = "loader::script",
        level = "debug",
        skip_all,
        fields(origin = %origin.display())
    )]
    pub fn load_module(&self, source: &str, origin: &Path) -> anyhow::Result<Module> {
        let mut ast = self
            .engine
            .compile(source)
            .with_context(|| format!("failed to compile script {}", origin.display()))?;
        ast.set_source(origin.to_string_lossy().to_string());
        let ast = Arc::new(ast);

        let default: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut Scope::new(), &ast)
            .with_context(|| format!("failed to evaluate script {}", origin.display()))?;

        let mut module = Module::new();
        for function in ast.iter_functions() {
            let name = function.name.to_string();
            tracing::trace!(export = %name, params = function.params.len(), "Script export found");
            let callable = ScriptFunction {
                engine: Arc::clone(&self.engine),
                ast: Arc::clone(&ast),
                name: name.clone(),
            };
            module = module.with_export(name.clone(), Value::Function(Function::new(name, callable)));
        }

        if !default.is_unit() {
            module = module.with_default(from_dynamic(&self.engine, &ast, default)?);
        }

        Ok(module)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("max_operations", &MAX_OPERATIONS)
            .finish()
    }
}

impl ExpressionEngine for ScriptEngine {
    #[instrument(
        name = "route_runner::compile_function",
        target = "loader::script",
        level = "debug",
        skip_all
    )]
    fn compile_function(&self, source: &str) -> Result<Function, ExpressionError> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| ExpressionError::Evaluation(e.to_string()))?;
        let value: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut Scope::new(), &ast)
            .map_err(|e| ExpressionError::Evaluation(e.to_string()))?;

        let type_name = value.type_name();
        let fn_ptr = value
            .try_cast::<FnPtr>()
            .ok_or(ExpressionError::NotCallable(type_name))?;

        tracing::debug!(function = %fn_ptr.fn_name(), "Function literal compiled");
        Ok(closure(Arc::clone(&self.engine), Arc::new(ast), fn_ptr))
    }
}

/// Named function defined in a script module.
struct ScriptFunction {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    name: String,
}

impl ScriptFunction {
    fn invoke(&self, this: Option<&Variables>, args: Vec<Value>) -> anyhow::Result<Value> {
        let out = call_with_this(&self.engine, &self.ast, &self.name, this, to_dynamic_args(args)?)?;
        from_dynamic(&self.engine, &self.ast, out)
    }
}

impl Callable for ScriptFunction {
    fn call<'a>(
        &'a self,
        this: Option<&'a Variables>,
        args: Vec<Value>,
    ) -> BoxFuture<'a, anyhow::Result<Value>> {
        future::ready(self.invoke(this, args)).boxed()
    }
}

/// Function pointer or closure produced by evaluating a script expression.
struct ScriptClosure {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    fn_ptr: FnPtr,
}

impl ScriptClosure {
    fn invoke(&self, this: Option<&Variables>, args: Vec<Value>) -> anyhow::Result<Value> {
        let args = to_dynamic_args(args)?;
        let name = self.fn_ptr.fn_name();

        // `this` can only be bound on a direct call into the AST. Captured
        // closure variables travel as leading curried arguments.
        let out: Dynamic = match this {
            Some(_) if self.ast.iter_functions().any(|f| f.name == name) => {
                let mut curried = self.fn_ptr.curry().to_vec();
                curried.extend(args);
                call_with_this(&self.engine, &self.ast, name, this, curried)?
            }
            _ => self.fn_ptr.call(&self.engine, &self.ast, args)?,
        };
        from_dynamic(&self.engine, &self.ast, out)
    }
}

impl Callable for ScriptClosure {
    fn call<'a>(
        &'a self,
        this: Option<&'a Variables>,
        args: Vec<Value>,
    ) -> BoxFuture<'a, anyhow::Result<Value>> {
        future::ready(self.invoke(this, args)).boxed()
    }
}

fn closure(engine: Arc<Engine>, ast: Arc<AST>, fn_ptr: FnPtr) -> Function {
    let name = fn_ptr.fn_name().to_string();
    Function::new(name, ScriptClosure { engine, ast, fn_ptr })
}

/// Calls a script function defined in `ast`, binding `this` when a context
/// is supplied.
fn call_with_this(
    engine: &Engine,
    ast: &AST,
    name: &str,
    this: Option<&Variables>,
    args: Vec<Dynamic>,
) -> anyhow::Result<Dynamic> {
    let mut this_value = this.map(rhai::serde::to_dynamic).transpose()?;

    let mut options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
    if let Some(value) = this_value.as_mut() {
        options = options.bind_this_ptr(value);
    }

    Ok(engine.call_fn_with_options::<Dynamic>(options, &mut Scope::new(), ast, name, args)?)
}

fn to_dynamic_args(args: Vec<Value>) -> anyhow::Result<Vec<Dynamic>> {
    args.iter()
        .enumerate()
        .map(|(position, arg)| {
            let json = arg.to_json().ok_or_else(|| {
                anyhow!(
                    "argument {position} ('{}') cannot be passed to a script function",
                    arg.type_name()
                )
            })?;
            Ok(rhai::serde::to_dynamic(json)?)
        })
        .collect()
}

fn from_dynamic(engine: &Arc<Engine>, ast: &Arc<AST>, value: Dynamic) -> anyhow::Result<Value> {
    if value.is::<FnPtr>() {
        let fn_ptr = value.cast::<FnPtr>();
        return Ok(Value::Function(closure(Arc::clone(engine), Arc::clone(ast), fn_ptr)));
    }
    if value.is_unit() {
        return Ok(Value::Null);
    }

    let json: JsonValue = rhai::serde::from_dynamic(&value)?;
    Ok(Value::from(json))
}
