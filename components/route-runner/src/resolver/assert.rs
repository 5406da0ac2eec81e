//! Structural guards over loosely-typed configuration.
//!
//! Every guard takes the label used in error messages and an optional value,
//! where `None` means the key was absent.

// Local crates
use crate::loader::ImportSpec;
use crate::resolver::error::ResolveError;

// External crates
use serde_json::{Map as JsonMap, Value as JsonValue};

const STRING: &str = "'string'";
const OBJECT: &str = "'object'";
const OBJECT_OR_STRING: &str = "'object' or 'string'";
const OBJECT_OR_ARRAY: &str = "'object' or 'array'";

/// Type label for error messages.
pub fn type_name(value: Option<&JsonValue>) -> &'static str {
    match value {
        None => "missing",
        Some(JsonValue::Null) => "null",
        Some(JsonValue::Bool(_)) => "boolean",
        Some(JsonValue::Number(_)) => "number",
        Some(JsonValue::String(_)) => "string",
        Some(JsonValue::Array(_)) => "array",
        Some(JsonValue::Object(_)) => "object",
    }
}

pub fn assert_string<'a>(name: &str, value: Option<&'a JsonValue>) -> Result<&'a str, ResolveError> {
    match value {
        Some(JsonValue::String(s)) => Ok(s),
        other => Err(ResolveError::type_mismatch(name, STRING, type_name(other))),
    }
}

pub fn assert_object<'a>(
    name: &str,
    value: Option<&'a JsonValue>,
) -> Result<&'a JsonMap<String, JsonValue>, ResolveError> {
    match value {
        Some(JsonValue::Object(map)) => Ok(map),
        other => Err(ResolveError::type_mismatch(name, OBJECT, type_name(other))),
    }
}

pub fn assert_object_or_string<'a>(
    name: &str,
    value: Option<&'a JsonValue>,
) -> Result<&'a JsonValue, ResolveError> {
    match value {
        Some(v @ (JsonValue::Object(_) | JsonValue::String(_))) => Ok(v),
        other => Err(ResolveError::type_mismatch(name, OBJECT_OR_STRING, type_name(other))),
    }
}

/// Narrows a reader/writer specifier: a module string, or
/// `{ module, export?, args? }`.
pub fn assert_import_specifier(name: &str, value: Option<&JsonValue>) -> Result<ImportSpec, ResolveError> {
    let mut spec = specifier_shape(name, value)?;

    if let Some(JsonValue::Object(map)) = value {
        match present(map.get("args")) {
            None => {}
            Some(args @ (JsonValue::Object(_) | JsonValue::Array(_))) => spec.args = Some(args.clone()),
            Some(other) => {
                return Err(ResolveError::type_mismatch(
                    format!("{name}.args"),
                    OBJECT_OR_ARRAY,
                    type_name(Some(other)),
                ));
            }
        }
    }

    Ok(spec)
}

/// Narrows a controller specifier. Controllers are used as loaded, so any
/// `args` are dropped.
pub fn assert_controller(name: &str, value: Option<&JsonValue>) -> Result<ImportSpec, ResolveError> {
    let spec = specifier_shape(name, value)?;

    if let Some(JsonValue::Object(map)) = value {
        if present(map.get("args")).is_some() {
            tracing::warn!(key = %name, "Controller arguments are ignored");
        }
    }

    Ok(spec)
}

fn specifier_shape(name: &str, value: Option<&JsonValue>) -> Result<ImportSpec, ResolveError> {
    let spec = match assert_object_or_string(name, value)? {
        JsonValue::Object(map) => {
            let module = assert_string(&format!("{name}.module"), map.get("module"))?;
            let mut spec = ImportSpec::new(module);
            if let Some(export) = present(map.get("export")) {
                spec = spec.with_export(assert_string(&format!("{name}.export"), Some(export))?);
            }
            spec
        }
        module => ImportSpec::new(module.as_str().unwrap_or_default()),
    };

    if spec.module.trim().is_empty() {
        return Err(ResolveError::contract(
            format!("{name}.module"),
            "module specifier must not be empty.",
        ));
    }

    Ok(spec)
}

/// Optional keys treat an explicit `null` as absent.
pub(crate) fn present(value: Option<&JsonValue>) -> Option<&JsonValue> {
    value.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn message(err: ResolveError) -> String {
        err.to_string()
    }

    #[test]
    fn reports_actual_type() {
        assert_eq!(type_name(None), "missing");
        assert_eq!(type_name(Some(&json!(null))), "null");
        assert_eq!(type_name(Some(&json!([1]))), "array");
        assert_eq!(type_name(Some(&json!({}))), "object");
        assert_eq!(type_name(Some(&json!(1.5))), "number");
        assert_eq!(type_name(Some(&json!(false))), "boolean");
    }

    #[test]
    fn string_guard() {
        assert_eq!(assert_string("name", Some(&json!("x"))).unwrap(), "x");
        assert_eq!(
            message(assert_string("name", Some(&json!(3))).unwrap_err()),
            "'name' type mismatch, expected 'string', got 'number'."
        );
    }

    #[test]
    fn object_guard_rejects_arrays() {
        let err = assert_object("variables", Some(&json!([]))).unwrap_err();
        assert_eq!(
            message(err),
            "'variables' type mismatch, expected 'object', got 'array'."
        );
    }

    #[test]
    fn bare_string_specifier() {
        let spec = assert_import_specifier("from", Some(&json!("./reader"))).unwrap();
        assert_eq!(spec, ImportSpec::new("./reader"));
    }

    #[test]
    fn full_object_specifier() {
        let raw = json!({"module": "./reader", "export": "all", "args": [{"a": 1}]});
        let spec = assert_import_specifier("from", Some(&raw)).unwrap();

        assert_eq!(spec.module, "./reader");
        assert_eq!(spec.export_name(), "all");
        assert_eq!(spec.args, Some(json!([{"a": 1}])));
    }

    #[test]
    fn missing_specifier() {
        let err = assert_import_specifier("to", None).unwrap_err();
        assert_eq!(
            message(err),
            "'to' type mismatch, expected 'object' or 'string', got 'missing'."
        );
    }

    #[test]
    fn module_must_be_string() {
        let err = assert_import_specifier("from", Some(&json!({"module": 42}))).unwrap_err();
        assert_eq!(
            message(err),
            "'from.module' type mismatch, expected 'string', got 'number'."
        );
    }

    #[test]
    fn export_must_be_string() {
        let raw = json!({"module": "./r", "export": ["x"]});
        let err = assert_import_specifier("from", Some(&raw)).unwrap_err();
        assert_eq!(
            message(err),
            "'from.export' type mismatch, expected 'string', got 'array'."
        );
    }

    #[test]
    fn args_must_be_object_or_array() {
        let raw = json!({"module": "./r", "args": "nope"});
        let err = assert_import_specifier("from", Some(&raw)).unwrap_err();
        assert_eq!(
            message(err),
            "'from.args' type mismatch, expected 'object' or 'array', got 'string'."
        );
    }

    #[test]
    fn null_optionals_are_absent() {
        let raw = json!({"module": "./r", "export": null, "args": null});
        let spec = assert_import_specifier("from", Some(&raw)).unwrap();
        assert_eq!(spec, ImportSpec::new("./r"));
    }

    #[test]
    fn empty_module_is_rejected() {
        let err = assert_import_specifier("to", Some(&json!(""))).unwrap_err();
        assert!(matches!(err, ResolveError::ContractViolation { ref key, .. } if key == "to.module"));
    }

    #[test]
    fn controller_drops_args() {
        let raw = json!({"module": "./ctl", "export": "run", "args": {"x": 1}});
        let spec = assert_controller("controller", Some(&raw)).unwrap();

        assert_eq!(spec, ImportSpec::new("./ctl").with_export("run"));
    }
}
