//! Factory argument parsing.
//!
//! Object keys carrying one of the directive suffixes are replaced by the
//! value the directive computes, stored under the unsuffixed key:
//!
//! | key             | value                 | stored as                   |
//! |-----------------|-----------------------|-----------------------------|
//! | `name$raw`      | anything              | the value, untouched        |
//! | `name$function` | function literal      | compiled [`Function`]       |
//! | `name$import`   | import specifier      | the loaded export           |
//!
//! Everything else is walked recursively, arrays included.
//!
//! [`Function`]: crate::loader::Function

// Local crates
use crate::loader::{ExpressionEngine, ModuleLoader, Value, load_module};
use crate::resolver::{
    assert::{assert_import_specifier, assert_string},
    error::ResolveError,
};

// External crates
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Raw,
    Function,
    Import,
}

const DIRECTIVES: [(&str, Directive); 3] = [
    ("$raw", Directive::Raw),
    ("$function", Directive::Function),
    ("$import", Directive::Import),
];

/// Splits `name$suffix` into its base name and directive. A bare suffix is
/// an ordinary key.
fn split_directive(key: &str) -> Option<(&str, Directive)> {
    DIRECTIVES.iter().find_map(|(suffix, directive)| {
        key.strip_suffix(suffix)
            .filter(|base| !base.is_empty())
            .map(|base| (base, *directive))
    })
}

/// Walks factory arguments, evaluating directives along the way.
pub struct ArgParser<'a, L> {
    loader: &'a L,
    expressions: &'a dyn ExpressionEngine,
}

impl<'a, L: ModuleLoader> ArgParser<'a, L> {
    pub fn new(loader: &'a L, expressions: &'a dyn ExpressionEngine) -> Self {
        Self { loader, expressions }
    }

    /// Turns raw `args` into the positional argument list of a factory.
    ///
    /// An object is one argument, an array is one argument per element and
    /// anything else (including absent) is no arguments at all.
    #[instrument(
        name = "route_runner::resolve_args",
        target = "resolver::args",
        level = "trace",
        skip_all,
        fields(label = %label)
    )]
    pub async fn resolve_args(&self, label: &str, raw: Option<&JsonValue>) -> Result<Vec<Value>, ResolveError> {
        match raw {
            Some(JsonValue::Array(items)) => {
                let mut args = Vec::with_capacity(items.len());
                for (position, item) in items.iter().enumerate() {
                    args.push(self.walk(format!("{label}[{position}]"), item).await?);
                }
                Ok(args)
            }
            Some(object @ JsonValue::Object(_)) => Ok(vec![self.walk(label.to_string(), object).await?]),
            _ => Ok(Vec::new()),
        }
    }

    fn walk<'s>(&'s self, path: String, node: &'s JsonValue) -> BoxFuture<'s, Result<Value, ResolveError>> {
        async move {
            match node {
                JsonValue::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (position, item) in items.iter().enumerate() {
                        out.push(self.walk(format!("{path}[{position}]"), item).await?);
                    }
                    Ok(Value::List(out))
                }
                JsonValue::Object(map) => self.walk_object(&path, map).await,
                scalar => Ok(Value::from(scalar.clone())),
            }
        }
        .boxed()
    }

    async fn walk_object(&self, path: &str, map: &JsonMap<String, JsonValue>) -> Result<Value, ResolveError> {
        let mut directives: BTreeMap<&str, (&str, Directive, &JsonValue)> = BTreeMap::new();
        for (key, value) in map {
            let Some((base, directive)) = split_directive(key) else {
                continue;
            };
            if let Some((previous, _, _)) = directives.insert(base, (key.as_str(), directive, value)) {
                return Err(ResolveError::contract(
                    format!("{path}.{base}"),
                    format!("conflicting directives '{previous}' and '{key}'."),
                ));
            }
        }

        let mut out = BTreeMap::new();
        for (key, value) in map {
            if split_directive(key).is_some() {
                continue;
            }
            if directives.contains_key(key.as_str()) {
                tracing::trace!(key = %key, path = %path, "Plain key overridden by directive");
                continue;
            }
            out.insert(key.clone(), self.walk(format!("{path}.{key}"), value).await?);
        }

        for (base, (key, directive, value)) in directives {
            let label = format!("{path}.{key}");
            let resolved = self.apply(&label, directive, value).await?;
            out.insert(base.to_string(), resolved);
        }

        Ok(Value::Map(out))
    }

    async fn apply(&self, label: &str, directive: Directive, value: &JsonValue) -> Result<Value, ResolveError> {
        match directive {
            Directive::Raw => Ok(Value::from(value.clone())),
            Directive::Function => {
                let source = assert_string(label, Some(value))?;
                let function = self
                    .expressions
                    .compile_function(source)
                    .map_err(|e| ResolveError::contract(label, e.to_string()))?;
                tracing::trace!(key = %label, "Function literal evaluated");
                Ok(Value::Function(function))
            }
            Directive::Import => {
                let spec = assert_import_specifier(label, Some(value))?;
                if spec.args.is_some() {
                    tracing::warn!(key = %label, module = %spec.module, "Arguments of an imported value are ignored");
                }
                Ok(load_module(self.loader, &spec).await?)
            }
        }
    }
}

impl<L> std::fmt::Debug for ArgParser<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgParser").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Function, Module, ModuleLoadError, ScriptEngine};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves a fixed string export for any specifier and records what was
    /// asked for.
    #[derive(Default)]
    struct RecordingLoader {
        requests: Mutex<Vec<String>>,
    }

    impl RecordingLoader {
        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ModuleLoader for RecordingLoader {
        async fn load(&self, specifier: &str) -> Result<Module, ModuleLoadError> {
            self.requests.lock().unwrap().push(specifier.to_string());
            if specifier == "./missing" {
                return Err(ModuleLoadError::NotFound {
                    module: specifier.to_string(),
                    base_dir: ".".into(),
                });
            }
            Ok(Module::new()
                .with_export("layout", Value::from(format!("layout from {specifier}")))
                .with_default(Value::from(format!("default from {specifier}"))))
        }
    }

    async fn parse(raw: JsonValue) -> (Result<Vec<Value>, ResolveError>, Vec<String>) {
        let loader = RecordingLoader::default();
        let engine = ScriptEngine::new();
        let result = ArgParser::new(&loader, &engine)
            .resolve_args("from.args", Some(&raw))
            .await;
        (result, loader.requests())
    }

    fn json_args(args: &[Value]) -> Vec<JsonValue> {
        args.iter().map(|a| a.to_json().unwrap()).collect()
    }

    #[test]
    fn suffixes() {
        assert_eq!(split_directive("label$raw"), Some(("label", Directive::Raw)));
        assert_eq!(split_directive("f$function"), Some(("f", Directive::Function)));
        assert_eq!(split_directive("m$import"), Some(("m", Directive::Import)));
        assert_eq!(split_directive("$raw"), None);
        assert_eq!(split_directive("price$"), None);
        assert_eq!(split_directive("plain"), None);
    }

    #[tokio::test]
    async fn non_container_args_are_empty() {
        let loader = RecordingLoader::default();
        let engine = ScriptEngine::new();
        let parser = ArgParser::new(&loader, &engine);

        assert!(parser.resolve_args("a", None).await.unwrap().is_empty());
        assert!(parser.resolve_args("a", Some(&json!("x"))).await.unwrap().is_empty());
        assert!(parser.resolve_args("a", Some(&json!(3))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn object_is_single_argument_array_is_many() {
        let (args, _) = parse(json!({"dir": "pages"})).await;
        assert_eq!(json_args(&args.unwrap()), vec![json!({"dir": "pages"})]);

        let (args, _) = parse(json!([{"dir": "pages"}, 2, "three"])).await;
        assert_eq!(
            json_args(&args.unwrap()),
            vec![json!({"dir": "pages"}), json!(2), json!("three")]
        );
    }

    #[tokio::test]
    async fn raw_is_passed_through_without_loading() {
        let raw = json!({"label$raw": {"template$import": "./never", "x": [1, 2]}});
        let (args, requests) = parse(raw).await;

        assert_eq!(
            json_args(&args.unwrap()),
            vec![json!({"label": {"template$import": "./never", "x": [1, 2]}})]
        );
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn function_literal_becomes_callable() {
        let (args, _) = parse(json!({"out_file$function": "|r| r.source + \".html\""})).await;
        let args = args.unwrap();

        let out_file = args[0].get("out_file").and_then(Value::as_function).unwrap();
        let name = out_file
            .call(None, vec![Value::from(json!({"source": "about"}))])
            .await
            .unwrap();
        assert_eq!(name.as_str(), Some("about.html"));
        assert!(args[0].get("out_file$function").is_none());
    }

    #[tokio::test]
    async fn function_literal_must_be_string() {
        let (args, _) = parse(json!({"render$function": 12})).await;
        let err = args.unwrap_err();

        assert_eq!(
            err.to_string(),
            "'from.args.render$function' type mismatch, expected 'string', got 'number'."
        );
    }

    #[tokio::test]
    async fn function_literal_must_evaluate_to_callable() {
        let (args, _) = parse(json!([{"render$function": "1 + 1"}])).await;
        let err = args.unwrap_err();

        assert!(
            matches!(err, ResolveError::ContractViolation { ref key, .. } if key == "from.args[0].render$function"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn import_loads_export() {
        let raw = json!({
            "page$import": "./page",
            "layout$import": {"module": "./theme", "export": "layout"}
        });
        let (args, mut requests) = parse(raw).await;
        requests.sort();

        assert_eq!(
            json_args(&args.unwrap()),
            vec![json!({"page": "default from ./page", "layout": "layout from ./theme"})]
        );
        assert_eq!(requests, vec!["./page", "./theme"]);
    }

    #[tokio::test]
    async fn import_failure_propagates() {
        let (args, _) = parse(json!({"page$import": "./missing"})).await;
        assert!(matches!(args.unwrap_err(), ResolveError::ModuleLoad(_)));
    }

    #[tokio::test]
    async fn nested_structures_are_walked() {
        let raw = json!({
            "options": {
                "pages": [{"title$raw": "a$import"}, {"body$import": "./body"}]
            }
        });
        let (args, requests) = parse(raw).await;

        assert_eq!(
            json_args(&args.unwrap()),
            vec![json!({"options": {"pages": [{"title": "a$import"}, {"body": "default from ./body"}]}})]
        );
        assert_eq!(requests, vec!["./body"]);
    }

    #[tokio::test]
    async fn parsed_output_is_directive_free() {
        let raw = json!({"a$raw": 1, "b": {"c$raw": 2}, "d$import": "./x"});
        let (args, _) = parse(raw).await;
        let json = json_args(&args.unwrap()).remove(0);

        assert_eq!(json, json!({"a": 1, "b": {"c": 2}, "d": "default from ./x"}));
    }

    #[tokio::test]
    async fn conflicting_directives_are_rejected() {
        let (args, requests) = parse(json!({"x$raw": 1, "x$import": "./x"})).await;

        let err = args.unwrap_err();
        assert!(
            matches!(err, ResolveError::ContractViolation { ref key, .. } if key == "from.args.x"),
            "{err}"
        );
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn directive_overrides_plain_key() {
        let (args, _) = parse(json!({"title": "plain", "title$raw": "directive"})).await;
        assert_eq!(json_args(&args.unwrap()), vec![json!({"title": "directive"})]);
    }

    #[tokio::test]
    async fn bare_suffix_is_kept() {
        let (args, _) = parse(json!({"$raw": 1, "$import": "./x"})).await;
        assert_eq!(json_args(&args.unwrap()), vec![json!({"$raw": 1, "$import": "./x"})]);
    }

    #[tokio::test]
    async fn imported_functions_survive() {
        struct FnLoader;
        impl ModuleLoader for FnLoader {
            async fn load(&self, _specifier: &str) -> Result<Module, ModuleLoadError> {
                Ok(Module::new().with_default(Value::Function(Function::native(
                    "helper",
                    |_this, _args| async { Ok(Value::Null) },
                ))))
            }
        }

        let engine = ScriptEngine::new();
        let args = ArgParser::new(&FnLoader, &engine)
            .resolve_args("to.args", Some(&json!({"helper$import": "./helper"})))
            .await
            .unwrap();
        assert!(args[0].get("helper").is_some_and(Value::is_callable));
    }
}
