// Local crates
use crate::loader::value::Value;

// External crates
use std::collections::BTreeMap;

/// Export picked when an import specifier does not name one.
pub const DEFAULT_EXPORT: &str = "default";

/// A loaded module: named exports plus a distinguished default slot.
///
/// Modules are built fresh for every load, so resolving an export moves the
/// value out instead of cloning it.
#[derive(Debug, Default)]
pub struct Module {
    exports: BTreeMap<String, Value>,
    default: Option<Box<Value>>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(Box::new(value));
        self
    }

    pub fn with_export(mut self, name: impl Into<String>, value: Value) -> Self {
        self.exports.insert(name.into(), value);
        self
    }

    pub fn has_export(&self, name: &str) -> bool {
        self.exports.contains_key(name) || (name == DEFAULT_EXPORT && self.default.is_some())
    }
}

/// Picks the value an import specifier refers to.
///
/// Lookup order:
/// 1. the requested export (for `"default"`, the default slot),
/// 2. the matching named property of the default export,
/// 3. the default export itself,
/// 4. the module object itself.
///
/// A `null` export counts as missing in the first two steps.
pub fn resolve_export(mut module: Module, preferred: &str) -> Value {
    if let Some(value) = module.exports.remove(preferred).filter(|v| !v.is_null()) {
        return value;
    }

    match module.default.take().map(|boxed| *boxed) {
        Some(Value::Module(mut inner)) => {
            if preferred != DEFAULT_EXPORT {
                if let Some(value) = inner.exports.remove(preferred).filter(|v| !v.is_null()) {
                    return value;
                }
            }
            Value::Module(inner)
        }
        Some(Value::Map(mut map)) => {
            if preferred != DEFAULT_EXPORT {
                if let Some(value) = map.remove(preferred).filter(|v| !v.is_null()) {
                    return value;
                }
            }
            Value::Map(map)
        }
        Some(other) => other,
        None => Value::Module(module),
    }
}
