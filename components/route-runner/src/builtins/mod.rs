//! Packages shipped with the runner, available under the `@ves/` scope.
//!
//! | package                | kind       | factory arguments                          |
//! |------------------------|------------|--------------------------------------------|
//! | `@ves/dir-reader`      | reader     | `{ dir, recursive?, extensions? }`         |
//! | `@ves/file-reader`     | reader     | `{ file }`                                 |
//! | `@ves/file-writer`     | writer     | `{ out_dir, out_file?, renderer? }`        |
//! | `@ves/stdout-writer`   | writer     | none                                       |
//! | `@ves/merge-variables` | controller | n/a                                        |

pub mod controllers;
pub mod readers;
pub mod writers;

// Local crates
use crate::loader::{Function, ModuleRegistry, Value};

// External crates
use anyhow::{Result, anyhow, bail};
use std::collections::BTreeMap;

/// Registry pre-populated with every built-in package.
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    readers::register(&mut registry);
    writers::register(&mut registry);
    controllers::register(&mut registry);
    registry
}

/// First positional argument as an options object. Missing means empty.
pub(crate) fn options(package: &str, args: Vec<Value>) -> Result<BTreeMap<String, Value>> {
    match args.into_iter().next() {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Map(map)) => Ok(map),
        Some(other) => bail!("{package}: expected an options object, got '{}'", other.type_name()),
    }
}

pub(crate) fn required_str<'a>(package: &str, options: &'a BTreeMap<String, Value>, key: &str) -> Result<&'a str> {
    options
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{package}: option '{key}' must be a string"))
}

pub(crate) fn optional_function(
    package: &str,
    options: &BTreeMap<String, Value>,
    key: &str,
) -> Result<Option<Function>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Function(f)) => Ok(Some(f.clone())),
        Some(other) => bail!(
            "{package}: option '{key}' must be a function, got '{}'",
            other.type_name()
        ),
    }
}
