//! Flattened route flags: `--from.args.dir pages --to ./writer` becomes
//! `{ "from": { "args": { "dir": "pages" } }, "to": "./writer" }`.

// External crates
use regex::Regex;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static ROUTE_FLAGS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"^(from|to)(\.module|\.export|(\.args)(\.[A-Za-z0-9_$-]+)+)?$",
        r"^controller(\.module|\.export)?$",
        r"^variables(\.[A-Za-z0-9_$-]+)+$",
    ]
    .map(|pattern| Regex::new(pattern).unwrap_or_else(|e| unreachable!("invalid flag pattern: {e}")))
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?$")
        .unwrap_or_else(|e| unreachable!("invalid number pattern: {e}"))
});

#[derive(Debug, Error, PartialEq)]
pub enum FlagError {
    #[error("{}", UnknownArguments(.0))]
    Unknown(Vec<String>),

    #[error("Conflicting values for '--{key}': a value and nested options cannot be combined.")]
    Conflict { key: String },
}

struct UnknownArguments<'a>(&'a [String]);

impl fmt::Display for UnknownArguments<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arg in self.0 {
            writeln!(f, "Unknown argument: {arg}")?;
        }
        write!(f, "\nSee --help for usage.")
    }
}

/// Whether `--name` is a recognised route flag.
pub fn is_route_flag(name: &str) -> bool {
    ROUTE_FLAGS.iter().any(|pattern| pattern.is_match(name))
}

/// Parses route flags into one route object.
///
/// `--key=value` and `--key value` are both accepted, a flag without a value
/// is `true`, numeric values become numbers and a repeated key collects its
/// values into an array.
pub fn parse_route_flags<S: AsRef<str>>(args: &[S]) -> Result<JsonValue, FlagError> {
    let mut route = JsonMap::new();
    let mut unknown = Vec::new();
    let mut tokens = args.iter().map(AsRef::as_ref).peekable();

    while let Some(token) = tokens.next() {
        let Some(flag) = token.strip_prefix("--") else {
            unknown.push(token.to_string());
            continue;
        };

        let (name, value) = match flag.split_once('=') {
            Some((name, value)) => (name, coerce(value)),
            None => match tokens.next_if(|next| !next.starts_with("--")) {
                Some(value) => (flag, coerce(value)),
                None => (flag, JsonValue::Bool(true)),
            },
        };

        if !is_route_flag(name) {
            unknown.push(format!("--{name}"));
            continue;
        }

        let path: Vec<&str> = name.split('.').collect();
        insert_path(&mut route, &path, value, name)?;
    }

    if !unknown.is_empty() {
        return Err(FlagError::Unknown(unknown));
    }

    tracing::trace!(keys = route.len(), "Route flags parsed");
    Ok(JsonValue::Object(route))
}

fn coerce(raw: &str) -> JsonValue {
    if NUMBER.is_match(raw) {
        if let Ok(int) = raw.parse::<i64>() {
            return JsonValue::Number(int.into());
        }
        if let Some(number) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return JsonValue::Number(number);
        }
    }
    JsonValue::String(raw.to_string())
}

fn insert_path(
    target: &mut JsonMap<String, JsonValue>,
    path: &[&str],
    value: JsonValue,
    full_key: &str,
) -> Result<(), FlagError> {
    let conflict = || FlagError::Conflict {
        key: full_key.to_string(),
    };

    match path {
        [] => Ok(()),
        [last] => {
            match target.get_mut(*last) {
                None => {
                    target.insert(last.to_string(), value);
                }
                Some(JsonValue::Object(_)) => return Err(conflict()),
                Some(JsonValue::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = JsonValue::Array(vec![first, value]);
                }
            }
            Ok(())
        }
        [head, rest @ ..] => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| JsonValue::Object(JsonMap::new()));
            match child {
                JsonValue::Object(map) => insert_path(map, rest, value, full_key),
                _ => Err(conflict()),
            }
        }
    }
}
