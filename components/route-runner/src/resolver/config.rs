// Local crates
use crate::loader::{ImportSpec, Variables};
use crate::resolver::{
    assert::{assert_controller, assert_import_specifier, assert_object, present},
    error::ResolveError,
};

// External crates
use serde_json::Value as JsonValue;

/// One route entry after shape validation. Nothing has been loaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    pub from: ImportSpec,
    pub to: ImportSpec,
    pub controller: Option<ImportSpec>,
    pub variables: Variables,
}

impl RouteConfig {
    /// Runs every shape guard for one entry.
    pub fn from_value(raw: &JsonValue) -> Result<Self, ResolveError> {
        let route = assert_object("route", Some(raw))?;

        let from = assert_import_specifier("from", route.get("from"))?;
        let to = assert_import_specifier("to", route.get("to"))?;
        let controller = present(route.get("controller"))
            .map(|c| assert_controller("controller", Some(c)))
            .transpose()?;
        let variables = present(route.get("variables"))
            .map(|v| assert_object("variables", Some(v)).cloned())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            from,
            to,
            controller,
            variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn minimal_route() {
        let config = RouteConfig::from_value(&json!({"from": "./r", "to": "./w"})).unwrap();

        assert_eq!(config.from, ImportSpec::new("./r"));
        assert_eq!(config.to, ImportSpec::new("./w"));
        assert_eq!(config.controller, None);
        assert!(config.variables.is_empty());
    }

    #[test]
    fn route_must_be_object() {
        let err = RouteConfig::from_value(&json!(["./r"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'route' type mismatch, expected 'object', got 'array'."
        );
    }

    #[test]
    fn from_is_checked_before_to() {
        let err = RouteConfig::from_value(&json!({})).unwrap_err();
        assert!(matches!(err, ResolveError::TypeMismatch { ref name, .. } if name == "from"));

        let err = RouteConfig::from_value(&json!({"from": "./r"})).unwrap_err();
        assert!(matches!(err, ResolveError::TypeMismatch { ref name, .. } if name == "to"));
    }

    #[test]
    fn variables_must_be_object() {
        let raw = json!({"from": "./r", "to": "./w", "variables": "x"});
        let err = RouteConfig::from_value(&raw).unwrap_err();
        assert!(matches!(err, ResolveError::TypeMismatch { ref name, .. } if name == "variables"));
    }

    #[test]
    fn controller_and_variables_are_kept() {
        let raw = json!({
            "from": "./r",
            "to": "./w",
            "controller": {"module": "./c", "export": "run"},
            "variables": {"title": "Home"}
        });
        let config = RouteConfig::from_value(&raw).unwrap();

        assert_eq!(config.controller, Some(ImportSpec::new("./c").with_export("run")));
        assert_eq!(config.variables.get("title"), Some(&json!("Home")));
    }
}
