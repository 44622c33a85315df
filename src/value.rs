use crate::error::RenderError;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type LazyFuture = Pin<Box<dyn Future<Output = Result<Value, RenderError>> + Send>>;

/// 视图值的封闭变体。属性查找只对 `Map` 有意义，其余变体一律视为不拥有属性。
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Lazy(LazyValue),
    Section(SectionFn),
}

impl Value {
    pub fn has(&self, key: &str) -> bool {
        matches!(self, Value::Map(m) if m.contains_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// `Null`, `false` and the empty list are falsy; everything else,
    /// including an empty map, zero and the empty string, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    /// Displayable text for variable output. `None` means "emit nothing".
    /// Lists join their elements' text with a comma; absent elements
    /// contribute an empty string.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::I64(n) => Some(n.to_string()),
            Value::F64(n) => Some(n.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::List(items) => Some(
                items
                    .iter()
                    .map(|v| v.to_text().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Value::Map(_) => Some("[object]".to_string()),
            Value::Lazy(_) => Some("[lazy]".to_string()),
            Value::Section(_) => Some("[section]".to_string()),
        }
    }
}

/// Deferred single-outcome computation usable anywhere a plain value is
/// expected. Resolution always goes through the async machinery, and every
/// materialization re-invokes the computation; there is no implicit caching.
#[derive(Clone)]
pub struct LazyValue {
    getter: Arc<dyn Fn() -> LazyFuture + Send + Sync>,
}

impl LazyValue {
    pub fn new<F, Fut>(getter: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RenderError>> + Send + 'static,
    {
        LazyValue {
            getter: Arc::new(move || Box::pin(getter())),
        }
    }

    pub(crate) fn resolve(&self) -> LazyFuture {
        (self.getter)()
    }
}

/// Synchronous text transform usable as a section's resolved value. The
/// section body must be exactly one text node; the function receives that
/// text verbatim and its result is emitted unescaped.
#[derive(Clone)]
pub struct SectionFn {
    f: Arc<dyn Fn(&str) -> Result<Value, RenderError> + Send + Sync>,
}

impl SectionFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        SectionFn { f: Arc::new(f) }
    }

    pub(crate) fn call(&self, text: &str) -> Result<Value, RenderError> {
        (self.f)(text)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::I64(v) => f.debug_tuple("I64").field(v).finish(),
            Value::F64(v) => f.debug_tuple("F64").field(v).finish(),
            Value::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Value::List(v) => f.debug_tuple("List").field(v).finish(),
            Value::Map(v) => f.debug_tuple("Map").field(v).finish(),
            Value::Lazy(_) => f.write_str("Lazy(..)"),
            Value::Section(_) => f.write_str("Section(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Lazy(a), Value::Lazy(b)) => Arc::ptr_eq(&a.getter, &b.getter),
            (Value::Section(a), Value::Section(b)) => Arc::ptr_eq(&a.f, &b.f),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I64(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}
impl From<LazyValue> for Value {
    fn from(v: LazyValue) -> Self {
        Value::Lazy(v)
    }
}
impl From<SectionFn> for Value {
    fn from(v: SectionFn) -> Self {
        Value::Section(v)
    }
}
