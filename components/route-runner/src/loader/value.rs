//! Dynamic values produced by module loads, factory calls and argument parsing.
//!
//! A [`Value`] is whatever a module hands back: plain data coming from the
//! configuration, a callable [`Function`], a record [`Reader`] or a whole
//! [`Module`] object. Past the configuration boundary the resolver only ever
//! inspects values through these variants.

// Local crates
use crate::loader::module::Module;

// External crates
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Route `variables`, bound as `this` when a controller is invoked.
pub type Variables = JsonMap<String, JsonValue>;

/// A dynamically-typed value.
#[derive(Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Function(Function),
    Reader(Reader),
    Module(Module),
}

impl Value {
    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "array",
            Value::Map(_) => "object",
            Value::Function(_) => "function",
            Value::Reader(_) => "reader",
            Value::Module(_) => "module",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Property lookup on a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Converts back into plain JSON.
    ///
    /// Returns `None` as soon as the tree holds something that has no JSON
    /// form (functions, readers, modules).
    pub fn to_json(&self) -> Option<JsonValue> {
        Some(match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.clone()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Map(map) => {
                let mut out = JsonMap::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                JsonValue::Object(out)
            }
            Value::Function(_) | Value::Reader(_) | Value::Module(_) => return None,
        })
    }

    /// Turns a synchronous (`List`) or asynchronous (`Reader`) iterable into a
    /// [`Reader`]. Any other value is handed back unchanged.
    pub fn into_reader(self) -> Result<Reader, Value> {
        match self {
            Value::Reader(reader) => Ok(reader),
            Value::List(items) => Ok(Reader::from_values(items)),
            other => Err(other),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Function(value)
    }
}

/// Anything that can be invoked like a function: native Rust closures,
/// script functions and function literals.
pub trait Callable: Send + Sync {
    fn call<'a>(
        &'a self,
        this: Option<&'a Variables>,
        args: Vec<Value>,
    ) -> BoxFuture<'a, anyhow::Result<Value>>;
}

/// Cheaply clonable handle to a [`Callable`].
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    inner: Arc<dyn Callable>,
}

impl Function {
    pub fn new(name: impl Into<Arc<str>>, callable: impl Callable + 'static) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(callable),
        }
    }

    /// Wraps an async Rust closure. The closure receives an owned copy of
    /// the bound `this` context and the positional arguments.
    pub fn native<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Option<Variables>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, NativeFn(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, this: Option<&Variables>, args: Vec<Value>) -> anyhow::Result<Value> {
        self.inner.call(this, args).await
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

struct NativeFn<F>(F);

impl<F, Fut> Callable for NativeFn<F>
where
    F: Fn(Option<Variables>, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        this: Option<&'a Variables>,
        args: Vec<Value>,
    ) -> BoxFuture<'a, anyhow::Result<Value>> {
        (self.0)(this.cloned(), args).boxed()
    }
}

/// A single-pass stream of records.
pub struct Reader {
    inner: BoxStream<'static, anyhow::Result<Value>>,
}

impl Reader {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self::from_stream(stream::iter(values.into_iter().map(Ok)))
    }
}

impl Stream for Reader {
    type Item = anyhow::Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reader(..)")
    }
}
