// Local crates
use crate::loader::module::DEFAULT_EXPORT;

// External crates
use serde_json::Value as JsonValue;

/// Normalized import specifier: `{ module, export?, args? }`.
///
/// The bare-string form `"./reader"` is shorthand for `{ module: "./reader" }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    pub module: String,
    pub export: Option<String>,
    /// Raw factory arguments, an object or an array. Parsed by
    /// [`crate::resolver::args`] exactly once per resolution.
    pub args: Option<JsonValue>,
}

impl ImportSpec {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            export: None,
            args: None,
        }
    }

    pub fn with_export(mut self, export: impl Into<String>) -> Self {
        self.export = Some(export.into());
        self
    }

    pub fn export_name(&self) -> &str {
        self.export.as_deref().unwrap_or(DEFAULT_EXPORT)
    }
}
