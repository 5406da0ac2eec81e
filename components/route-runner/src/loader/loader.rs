// Local crates
use crate::loader::{
    module::{Module, resolve_export},
    script::ScriptEngine,
    specifier::ImportSpec,
    value::Value,
};

// External crates
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Extensions tried, in order, after the specifier as written.
const MODULE_EXTENSIONS: [&str; 4] = ["rhai", "json", "yaml", "yml"];

#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("Failed to load module '{module}': no such module (resolved from {})", base_dir.display())]
    NotFound { module: String, base_dir: PathBuf },

    #[error("Failed to load module '{module}': {cause}")]
    Read { module: String, cause: io::Error },

    #[error("Failed to load module '{module}': {cause:#}")]
    Evaluation { module: String, cause: anyhow::Error },
}

impl ModuleLoadError {
    pub fn module(&self) -> &str {
        match self {
            ModuleLoadError::NotFound { module, .. }
            | ModuleLoadError::Read { module, .. }
            | ModuleLoadError::Evaluation { module, .. } => module,
        }
    }
}

/// Mechanism that turns a module specifier into a [`Module`].
///
/// Implementations must not cache: every call is a fresh resolution.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, specifier: &str) -> impl Future<Output = Result<Module, ModuleLoadError>> + Send;
}

type ModuleFactory = Arc<dyn Fn() -> Module + Send + Sync>;

/// Named module factories, keyed by package name or absolute path.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Module + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::trace!(module = %name, "Module registered");
        self.factories.insert(name, Arc::new(factory));
    }

    fn build(&self, name: &str) -> Option<Module> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ModuleRegistry").field("modules", &names).finish()
    }
}

/// Default loader: registered modules first, then script and data files
/// resolved against `base_dir`.
#[derive(Debug)]
pub struct RegistryLoader {
    base_dir: PathBuf,
    registry: ModuleRegistry,
    scripts: ScriptEngine,
}

impl RegistryLoader {
    pub fn new(base_dir: impl Into<PathBuf>, registry: ModuleRegistry, scripts: ScriptEngine) -> Self {
        Self {
            base_dir: base_dir.into(),
            registry,
            scripts,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Registers a module under a relative or absolute specifier, so that
    /// `./name` in configuration resolves to it from this loader's base
    /// directory.
    pub fn register_relative<F>(&mut self, specifier: &str, factory: F)
    where
        F: Fn() -> Module + Send + Sync + 'static,
    {
        let key = self.resolve_path(specifier);
        self.registry.register(key.to_string_lossy(), factory);
    }

    fn resolve_path(&self, specifier: &str) -> PathBuf {
        normalize(&self.base_dir.join(specifier))
    }

    async fn load_file(&self, specifier: &str, path: &Path) -> Result<Option<Module>, ModuleLoadError> {
        for candidate in candidates(path) {
            match tokio::fs::metadata(&candidate).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(cause) => {
                    return Err(ModuleLoadError::Read {
                        module: specifier.to_string(),
                        cause,
                    });
                }
            }

            tracing::debug!(file = %candidate.display(), "Module file found");
            let source = tokio::fs::read_to_string(&candidate)
                .await
                .map_err(|cause| ModuleLoadError::Read {
                    module: specifier.to_string(),
                    cause,
                })?;

            let module = match candidate.extension().and_then(|e| e.to_str()) {
                Some("rhai") => self.scripts.load_module(&source, &candidate),
                Some("json") => serde_json::from_str::<JsonValue>(&source)
                    .map(data_module)
                    .map_err(anyhow::Error::from),
                Some("yaml" | "yml") => serde_yaml::from_str::<JsonValue>(&source)
                    .map(data_module)
                    .map_err(anyhow::Error::from),
                other => Err(anyhow::anyhow!(
                    "unsupported module format '{}'",
                    other.unwrap_or_default()
                )),
            };

            return module.map(Some).map_err(|cause| ModuleLoadError::Evaluation {
                module: specifier.to_string(),
                cause,
            });
        }

        Ok(None)
    }
}

impl ModuleLoader for RegistryLoader {
    #[instrument(
        name = "route_runner::registry_loader",
        target = "loader::loader",
        level = "trace",
        skip_all,
        fields(module = %specifier)
    )]
    async fn load(&self, specifier: &str) -> Result<Module, ModuleLoadError> {
        if !is_path_specifier(specifier) {
            return self
                .registry
                .build(specifier)
                .ok_or_else(|| ModuleLoadError::NotFound {
                    module: specifier.to_string(),
                    base_dir: self.base_dir.clone(),
                });
        }

        let path = self.resolve_path(specifier);
        if let Some(module) = self.registry.build(&path.to_string_lossy()) {
            tracing::trace!(path = %path.display(), "Resolved registered module");
            return Ok(module);
        }

        self.load_file(specifier, &path)
            .await?
            .ok_or_else(|| ModuleLoadError::NotFound {
                module: specifier.to_string(),
                base_dir: self.base_dir.clone(),
            })
    }
}

/// Loads the module named by `spec` and picks its export.
#[instrument(
    name = "route_runner::load_module",
    target = "loader::loader",
    level = "debug",
    skip_all,
    fields(module = %spec.module, export = %spec.export_name())
)]
pub async fn load_module<L: ModuleLoader>(loader: &L, spec: &ImportSpec) -> Result<Value, ModuleLoadError> {
    let module = loader.load(&spec.module).await?;
    let value = resolve_export(module, spec.export_name());

    tracing::debug!(kind = value.type_name(), "Module export resolved");
    Ok(value)
}

/// Document becomes the default export; a top-level object also exposes
/// its keys as named exports.
fn data_module(document: JsonValue) -> Module {
    let mut module = Module::new();
    if let JsonValue::Object(map) = &document {
        for (key, value) in map {
            module = module.with_export(key.clone(), Value::from(value.clone()));
        }
    }
    module.with_default(Value::from(document))
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

fn candidates(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    std::iter::once(path.to_path_buf()).chain(MODULE_EXTENSIONS.iter().map(move |ext| {
        let mut name = OsString::from(path.as_os_str());
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }))
}

/// Lexical normalization: drops `.` and folds `..` without touching the
/// filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
