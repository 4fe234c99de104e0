//! Dynamic values flowing between the request view, extractors and handlers
//!
//! - [`Value`]: plain data (typed scalars from the runtime, decoded bodies)
//! - [`Arg`]: anything a handler parameter can be bound to
//! - [`CallArgs`]: the `(args, kwargs)` pair an injector produces

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::field::PassKind;
use crate::request::Request;
use crate::upload::UploadFile;

// ============================================================================
// Value
// ============================================================================

/// Runtime value bound to a parameter or produced by a decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null/None value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value (UTF-8)
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Array of values
    List(Vec<Value>),
    /// Object with key-value pairs (preserves insertion order)
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Get human-readable type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Look up a member of an object value
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(pairs) => serde_json::Value::Object(
                pairs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Create from JSON value
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Null
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(arr) => Self::List(arr.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(obj) => Self::Object(
                obj.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// ============================================================================
// Arg
// ============================================================================

/// A bound argument.
///
/// Besides plain values a parameter can receive the request itself, upload
/// handles, or an opaque object produced by a dependency (a connection, a
/// service handle).
#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Request(Request),
    Upload(UploadFile),
    Uploads(Vec<UploadFile>),
    Object(Arc<dyn Any + Send + Sync>),
}

impl Arg {
    /// Wrap an arbitrary object produced by a dependency
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(Arc::new(value))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Self::Request(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_upload(&self) -> Option<&UploadFile> {
        match self {
            Self::Upload(u) => Some(u),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Request(a), Self::Request(b)) => a.ptr_eq(b),
            (Self::Upload(a), Self::Upload(b)) => a.ptr_eq(b),
            (Self::Uploads(a), Self::Uploads(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ptr_eq(y))
            }
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Request(r) => f.debug_tuple("Request").field(&r.path()).finish(),
            Self::Upload(u) => f.debug_tuple("Upload").field(&u.filename()).finish(),
            Self::Uploads(u) => f.debug_tuple("Uploads").field(&u.len()).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
        }
    }
}

// ============================================================================
// CallArgs
// ============================================================================

/// Positional and keyword arguments for one handler invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Arg>,
    pub kwargs: HashMap<String, Arg>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            args: Vec::with_capacity(capacity),
            kwargs: HashMap::with_capacity(capacity),
        }
    }

    /// Place an argument according to its passing discipline
    pub fn push(&mut self, pass: PassKind, name: &str, arg: Arg) {
        match pass {
            PassKind::Positional => self.args.push(arg),
            PassKind::Keyword => {
                self.kwargs.insert(name.to_string(), arg);
            }
        }
    }

    /// Keyword argument by name
    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.kwargs.get(name)
    }

    /// Keyword argument by name, as a plain value
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Arg::as_value)
    }

    /// Positional argument by index
    pub fn positional(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    pub fn len(&self) -> usize {
        self.args.len() + self.kwargs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_name() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Int(42).type_name(), "integer");
        assert_eq!(Value::Object(vec![]).type_name(), "object");
    }

    #[test]
    fn test_value_json_conversion() {
        let json = serde_json::json!({"name": "x", "price": 1.5, "tags": ["a"]});
        let value = Value::from_json(&json);
        assert_eq!(value.get("name"), Some(&Value::from("x")));
        assert_eq!(value.get("price"), Some(&Value::Float(1.5)));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_call_args_push() {
        let mut args = CallArgs::new();
        args.push(PassKind::Positional, "a", Arg::Value(Value::Int(1)));
        args.push(PassKind::Keyword, "b", Arg::Value(Value::Int(2)));

        assert_eq!(args.positional(0), Some(&Arg::Value(Value::Int(1))));
        assert_eq!(args.value("b"), Some(&Value::Int(2)));
        assert!(args.get("a").is_none());
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_arg_object_identity() {
        let obj = Arg::object(42u32);
        let same = obj.clone();
        let other = Arg::object(42u32);
        assert_eq!(obj, same);
        assert_ne!(obj, other);
        assert_eq!(obj.downcast_ref::<u32>(), Some(&42));
    }
}
