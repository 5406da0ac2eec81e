// Local crates
use crate::builtins::{optional_function, options, required_str};
use crate::loader::{Function, Module, ModuleRegistry, Value};

// External crates
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::Value as JsonValue;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

pub const FILE_WRITER: &str = "@ves/file-writer";
pub const STDOUT_WRITER: &str = "@ves/stdout-writer";

const DEFAULT_OUTPUT_NAME: &str = "default";
const OUTPUT_EXTENSION: &str = ".out";

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.register(FILE_WRITER, || {
        Module::new().with_default(Value::Function(Function::native(
            FILE_WRITER,
            |_this, args| async move { file_writer(args) },
        )))
    });
    registry.register(STDOUT_WRITER, || {
        Module::new().with_default(Value::Function(Function::native(
            STDOUT_WRITER,
            |_this, _args| async move { Ok(Value::Function(stdout_writer())) },
        )))
    });
}

#[derive(Debug)]
struct FileTarget {
    out_dir: PathBuf,
    out_file: Option<Function>,
    renderer: Option<Function>,
}

fn file_writer(args: Vec<Value>) -> Result<Value> {
    let options = options(FILE_WRITER, args)?;
    let target = Arc::new(FileTarget {
        out_dir: PathBuf::from(required_str(FILE_WRITER, &options, "out_dir")?),
        out_file: optional_function(FILE_WRITER, &options, "out_file")?,
        renderer: optional_function(FILE_WRITER, &options, "renderer")?,
    });

    tracing::debug!(out_dir = %target.out_dir.display(), "File writer initialized");
    let writer = Function::native(FILE_WRITER, move |_this, args| {
        let target = Arc::clone(&target);
        async move {
            let record = args
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("{FILE_WRITER}: called without a record"))?;
            write_record(&target, record).await
        }
    });

    Ok(Value::Function(writer))
}

#[instrument(
    name = "route_runner::write_record",
    target = "builtins::writers",
    level = "trace",
    skip_all
)]
async fn write_record(target: &FileTarget, record: Value) -> Result<Value> {
    let record = record
        .to_json()
        .ok_or_else(|| anyhow!("{FILE_WRITER}: a '{}' record cannot be written", record.type_name()))?;

    let name = match &target.out_file {
        Some(out_file) => {
            let name = out_file.call(None, vec![Value::from(record.clone())]).await?;
            name.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("{FILE_WRITER}: 'out_file' returned '{}', expected a string", name.type_name()))?
        }
        None => default_output_name(&record),
    };

    let content = match &target.renderer {
        Some(renderer) => {
            let rendered = renderer.call(None, vec![Value::from(record.clone())]).await?;
            match rendered {
                Value::String(s) => s,
                other => other
                    .to_json()
                    .map(|json| json.to_string())
                    .ok_or_else(|| anyhow!("{FILE_WRITER}: 'renderer' returned '{}'", other.type_name()))?,
            }
        }
        None => default_render(&record)?,
    };

    let path = output_path(&target.out_dir, &name)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::debug!(file = %path.display(), "Record written");
    Ok(Value::Null)
}

/// `output`, else `source`, else `"default"`, plus the `.out` extension.
/// Joins `name` onto `out_dir`, refusing names that would land outside it.
fn output_path(out_dir: &Path, name: &str) -> Result<PathBuf> {
    let escapes = Path::new(name)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if name.is_empty() || escapes {
        return Err(anyhow!("{FILE_WRITER}: output name '{name}' must be a relative path inside 'out_dir'"));
    }
    Ok(out_dir.join(name))
}

fn default_output_name(record: &JsonValue) -> String {
    let stem = ["output", "source"]
        .iter()
        .filter_map(|key| record.get(key).and_then(JsonValue::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_OUTPUT_NAME);
    format!("{stem}{OUTPUT_EXTENSION}")
}

fn default_render(record: &JsonValue) -> Result<String> {
    Ok(format!("OUTPUT BEGIN --\n{}\nOUTPUT END ---", to_pretty_json(record)?))
}

/// Pretty JSON with four-space indentation.
fn to_pretty_json(value: &JsonValue) -> Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buffer)?)
}

fn stdout_writer() -> Function {
    Function::native(STDOUT_WRITER, |_this, args| async move {
        for record in args {
            let line = record
                .to_json()
                .ok_or_else(|| anyhow!("{STDOUT_WRITER}: a '{}' record cannot be written", record.type_name()))?;
            println!("{line}");
        }
        Ok(Value::Null)
    })
}
