//! Dynamic module loading: specifiers in, exported values out.

pub mod loader;
pub mod module;
pub mod script;
pub mod specifier;
pub mod value;

pub use loader::{ModuleLoadError, ModuleLoader, ModuleRegistry, RegistryLoader, load_module};
pub use module::{DEFAULT_EXPORT, Module, resolve_export};
pub use script::{ExpressionEngine, ExpressionError, ScriptEngine};
pub use specifier::ImportSpec;
pub use value::{Callable, Function, Reader, Value, Variables};
