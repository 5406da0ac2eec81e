// Local crates
use crate::builtins::{options, required_str};
use crate::loader::{Function, Module, ModuleRegistry, Reader, Value};

// External crates
use anyhow::{Context, Result, anyhow};
use async_stream::try_stream;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::path::{Path, PathBuf};
use tracing::instrument;
use walkdir::WalkDir;

pub const DIR_READER: &str = "@ves/dir-reader";
pub const FILE_READER: &str = "@ves/file-reader";

const DEFAULT_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.register(DIR_READER, || {
        Module::new().with_default(Value::Function(Function::native(
            DIR_READER,
            |_this, args| async move { dir_reader(args) },
        )))
    });
    registry.register(FILE_READER, || {
        Module::new().with_default(Value::Function(Function::native(
            FILE_READER,
            |_this, args| async move { file_reader(args).await },
        )))
    });
}

#[derive(Debug, Clone)]
struct DirReaderOptions {
    dir: PathBuf,
    recursive: bool,
    extensions: Vec<String>,
}

impl DirReaderOptions {
    fn from_args(args: Vec<Value>) -> Result<Self> {
        let options = options(DIR_READER, args)?;
        let dir = PathBuf::from(required_str(DIR_READER, &options, "dir")?);
        let recursive = options.get("recursive").and_then(Value::as_bool).unwrap_or(false);
        let extensions = match options.get("extensions") {
            None | Some(Value::Null) => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|e| e.trim_start_matches('.').to_string())
                        .ok_or_else(|| anyhow!("{DIR_READER}: 'extensions' must list strings"))
                })
                .collect::<Result<_>>()?,
            Some(Value::String(single)) => vec![single.trim_start_matches('.').to_string()],
            Some(other) => {
                return Err(anyhow!(
                    "{DIR_READER}: 'extensions' must be a list, got '{}'",
                    other.type_name()
                ));
            }
        };

        Ok(Self {
            dir,
            recursive,
            extensions,
        })
    }
}

/// One record per data file under `dir`, in path order.
fn dir_reader(args: Vec<Value>) -> Result<Value> {
    let options = DirReaderOptions::from_args(args)?;
    if !options.dir.is_dir() {
        return Err(anyhow!("{DIR_READER}: '{}' is not a directory", options.dir.display()));
    }

    let stream = try_stream! {
        for path in discover_files(&options)? {
            let source = path
                .strip_prefix(&options.dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let document = read_document(&path).await?;
            tracing::trace!(file = %path.display(), "Record read");
            yield record(source, document);
        }
    };

    Ok(Value::Reader(Reader::from_stream(stream)))
}

/// Single record built from one data file.
async fn file_reader(args: Vec<Value>) -> Result<Value> {
    let options = options(FILE_READER, args)?;
    let file = required_str(FILE_READER, &options, "file")?;

    let document = read_document(Path::new(file)).await?;
    Ok(Value::List(vec![record(file.to_string(), document)]))
}

#[instrument(
    name = "route_runner::discover_files",
    target = "builtins::readers",
    level = "debug",
    skip_all,
    fields(dir = %options.dir.display(), recursive = options.recursive)
)]
fn discover_files(options: &DirReaderOptions) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in build_walker(options) {
        let entry = entry.with_context(|| format!("failed to walk {}", options.dir.display()))?;
        let path = entry.into_path();
        if valid_file_format(&path, &options.extensions) {
            files.push(path);
        }
    }

    tracing::debug!(files = files.len(), "Data files discovered");
    Ok(files)
}

fn build_walker(options: &DirReaderOptions) -> WalkDir {
    let mut filesystem_walker = WalkDir::new(&options.dir)
        .follow_links(false)
        .same_file_system(true)
        .sort_by_file_name();

    if !options.recursive {
        filesystem_walker = filesystem_walker.min_depth(1).max_depth(1)
    }

    filesystem_walker
}

fn valid_file_format(path: &Path, extensions: &[String]) -> bool {
    if path.is_dir() {
        return false;
    }

    if let Some(file_name) = path.file_name().and_then(|s| s.to_str()) {
        if file_name.starts_with('.') {
            return false;
        }
    }

    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed == ext))
}

async fn read_document(path: &Path) -> Result<JsonValue> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("failed to parse JSON from {}", path.display())),
        _ => serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse YAML from {}", path.display())),
    }
}

/// `{ source, ...document }`; a `source` key in the document wins. Non-object
/// documents are nested under `data`.
fn record(source: String, document: JsonValue) -> Value {
    let mut record = JsonMap::new();
    record.insert("source".to_string(), JsonValue::String(source));
    match document {
        JsonValue::Object(fields) => record.extend(fields),
        other => {
            record.insert("data".to_string(), other);
        }
    }
    Value::from(JsonValue::Object(record))
}
