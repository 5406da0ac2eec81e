// Shared fixtures for integration tests: a scratch project directory with a
// data folder, plus the `./reader-all`, `./reader-file` and `./writer` modules.

#![allow(dead_code)]

use route_runner::builtins;
use route_runner::loader::{
    Function, Module, ModuleLoadError, ModuleLoader, RegistryLoader, ScriptEngine, Value,
};
use route_runner::resolver::RouteResolver;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct Project {
    dir: TempDir,
}

impl Project {
    /// Project with `data/a.json` and `data/b.json`.
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().unwrap(),
        };
        project.write("data/a.json", r#"{"title": "Alpha", "body": "first"}"#);
        project.write("data/b.json", r#"{"title": "Beta", "output": "beta-page"}"#);
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Contents of a file the `./writer` module produced.
    pub fn produced(&self, name: &str) -> String {
        std::fs::read_to_string(self.path("temp").join(name)).unwrap()
    }

    pub fn produced_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path("temp"))
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn loader(&self) -> RegistryLoader {
        let mut loader = RegistryLoader::new(self.root(), builtins::registry(), ScriptEngine::new());

        let data = self.path("data");
        loader.register_relative("./reader-all", move || {
            let data = data.clone();
            Module::new().with_default(Value::Function(Function::native(
                "reader-all",
                move |_this, args| {
                    let data = data.clone();
                    async move { Ok(reader_all(&data, args)) }
                },
            )))
        });

        let data = self.path("data");
        loader.register_relative("./reader-file", move || {
            let data = data.clone();
            Module::new().with_default(Value::Function(Function::native(
                "reader-file",
                move |_this, args| {
                    let data = data.clone();
                    async move {
                        let file = args
                            .first()
                            .and_then(|a| a.get("file"))
                            .and_then(Value::as_str)
                            .ok_or_else(|| anyhow::anyhow!("reader-file: missing 'file'"))?
                            .to_string();
                        let mut record = read_json(&data.join(&file));
                        record.insert("source".into(), json!(file));
                        Ok(Value::List(vec![Value::from(JsonValue::Object(record))]))
                    }
                },
            )))
        });

        let out = self.path("temp");
        loader.register_relative("./writer", move || {
            let out = out.clone();
            Module::new().with_default(Value::Function(Function::native(
                "writer",
                move |_this, _args| {
                    let out = out.clone();
                    async move { Ok(Value::Function(writer(out))) }
                },
            )))
        });

        loader
    }

    pub fn resolver(&self) -> RouteResolver<RegistryLoader> {
        RouteResolver::new(self.loader(), Arc::new(ScriptEngine::new()))
    }

    pub fn counting_resolver(&self) -> (RouteResolver<CountingLoader<RegistryLoader>>, Arc<Mutex<Vec<String>>>) {
        let loads = Arc::new(Mutex::new(Vec::new()));
        let loader = CountingLoader {
            inner: self.loader(),
            loads: Arc::clone(&loads),
        };
        (RouteResolver::new(loader, Arc::new(ScriptEngine::new())), loads)
    }
}

/// Every `*.json` under `data`, sorted by name, as `{source, ...document}`.
/// An optional `label` argument is copied onto each record.
fn reader_all(data: &Path, args: Vec<Value>) -> Value {
    let label = args
        .first()
        .and_then(|a| a.get("label"))
        .and_then(Value::to_json);

    let mut files: Vec<_> = std::fs::read_dir(data)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "json"))
        .collect();
    files.sort();

    let records = files
        .iter()
        .map(|path| {
            let mut record = JsonMap::new();
            record.insert(
                "source".into(),
                json!(path.file_name().unwrap().to_string_lossy()),
            );
            record.extend(read_json(path));
            if let Some(label) = &label {
                record.insert("label".into(), label.clone());
            }
            Value::from(JsonValue::Object(record))
        })
        .collect();
    Value::List(records)
}

fn read_json(path: &Path) -> JsonMap<String, JsonValue> {
    match serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap() {
        JsonValue::Object(map) => map,
        other => panic!("fixture {} is not an object: {other}", path.display()),
    }
}

fn writer(out: PathBuf) -> Function {
    Function::native("writer", move |_this, args| {
        let out = out.clone();
        async move {
            let record = args[0].to_json().unwrap();
            let stem = ["output", "source"]
                .iter()
                .find_map(|k| record.get(k).and_then(JsonValue::as_str).filter(|s| !s.is_empty()))
                .unwrap_or("default")
                .to_string();
            std::fs::create_dir_all(&out)?;
            std::fs::write(
                out.join(format!("{stem}.out")),
                format!("OUTPUT BEGIN --\n{}\nOUTPUT END ---", pretty(&record)),
            )?;
            Ok(Value::Null)
        }
    })
}

pub fn pretty(value: &JsonValue) -> String {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Wraps a loader and records every specifier it is asked for.
pub struct CountingLoader<L> {
    inner: L,
    loads: Arc<Mutex<Vec<String>>>,
}

impl<L: ModuleLoader> ModuleLoader for CountingLoader<L> {
    async fn load(&self, specifier: &str) -> Result<Module, ModuleLoadError> {
        self.loads.lock().unwrap().push(specifier.to_string());
        self.inner.load(specifier).await
    }
}
