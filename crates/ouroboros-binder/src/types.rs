//! Declared parameter types
//!
//! An [`Annotation`] is the declared type of a handler parameter. The binder
//! only looks at it at registration time, to choose a source and build an
//! extractor; requests never inspect it.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::value::Value;

// ============================================================================
// Constraints
// ============================================================================

/// Constraints for string validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringConstraints {
    /// Minimum length (in characters, not bytes)
    pub min_length: Option<usize>,
    /// Maximum length (in characters, not bytes)
    pub max_length: Option<usize>,
    /// Regex pattern
    pub pattern: Option<StringPattern>,
    /// Predefined format validator
    pub format: Option<StringFormat>,
}

/// A user regex, compiled once when the owning handler is registered
#[derive(Clone)]
pub struct StringPattern {
    source: String,
    compiled: OnceCell<Regex>,
}

impl StringPattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The compiled regex. Only the first call compiles; later calls read
    /// the cell without locking.
    pub fn regex(&self) -> Result<&Regex, regex::Error> {
        self.compiled.get_or_try_init(|| Regex::new(&self.source))
    }
}

impl From<&str> for StringPattern {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl PartialEq for StringPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for StringPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StringPattern").field(&self.source).finish()
    }
}

/// A pattern constraint that does not compile
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

/// Predefined string formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Uuid,
    /// ISO 8601 date-time
    DateTime,
    /// YYYY-MM-DD
    Date,
}

/// Inclusive numeric bounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericConstraints<T> {
    pub minimum: Option<T>,
    pub maximum: Option<T>,
}

// ============================================================================
// Annotation
// ============================================================================

/// Declared type of a handler parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// No validation, value passed through
    Any,
    String(StringConstraints),
    Int(NumericConstraints<i64>),
    Float(NumericConstraints<f64>),
    Bool,
    Bytes,
    List(Box<Annotation>),
    /// Nullable; a missing value binds to null
    Optional(Box<Annotation>),
    /// Structured record of several sub-fields
    Model(Arc<ModelSchema>),
    /// Uploaded file handle
    Upload,
    /// The request object itself
    Request,
}

impl Annotation {
    pub fn string() -> Self {
        Self::String(StringConstraints::default())
    }

    pub fn int() -> Self {
        Self::Int(NumericConstraints::default())
    }

    pub fn float() -> Self {
        Self::Float(NumericConstraints::default())
    }

    pub fn list(items: Annotation) -> Self {
        Self::List(Box::new(items))
    }

    pub fn optional(inner: Annotation) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn model(schema: ModelSchema) -> Self {
        Self::Model(Arc::new(schema))
    }

    /// Get human-readable type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String(_) => "string",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool => "boolean",
            Self::Bytes => "bytes",
            Self::List(_) => "array",
            Self::Optional(_) => "optional",
            Self::Model(_) => "object",
            Self::Upload => "upload",
            Self::Request => "request",
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// The annotation with one level of `Optional` removed
    pub fn unwrap_optional(&self) -> &Annotation {
        match self {
            Self::Optional(inner) => inner,
            other => other,
        }
    }

    /// Structured types are inferred as body parameters on unsafe methods
    pub fn is_structured(&self) -> bool {
        match self.unwrap_optional() {
            Self::Model(_) => true,
            Self::List(items) => matches!(items.as_ref(), Self::Model(_)),
            _ => false,
        }
    }

    /// Schema of a (possibly optional) model annotation
    pub fn model_schema(&self) -> Option<&Arc<ModelSchema>> {
        match self.unwrap_optional() {
            Self::Model(schema) => Some(schema),
            _ => None,
        }
    }

    /// Upload, optional upload, or list of uploads
    pub fn is_upload(&self) -> bool {
        match self.unwrap_optional() {
            Self::Upload => true,
            Self::List(items) => matches!(items.as_ref(), Self::Upload),
            _ => false,
        }
    }

    /// Expects several values for one key (lists of scalars or uploads)
    pub fn is_list(&self) -> bool {
        matches!(self.unwrap_optional(), Self::List(_))
    }

    /// Compile every pattern constraint reachable from this annotation
    pub fn compile_patterns(&self) -> Result<(), InvalidPattern> {
        match self {
            Self::String(StringConstraints {
                pattern: Some(pattern), ..
            }) => pattern.regex().map(|_| ()).map_err(|e| InvalidPattern {
                pattern: pattern.as_str().to_string(),
                reason: e.to_string(),
            }),
            Self::List(inner) | Self::Optional(inner) => inner.compile_patterns(),
            Self::Model(schema) => schema
                .fields
                .iter()
                .try_for_each(|field| field.annotation.compile_patterns()),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Model schema
// ============================================================================

/// A structured record type bundling several named sub-fields
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    pub name: String,
    pub fields: Vec<ModelField>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: ModelField) -> Self {
        self.fields.push(field);
        self
    }
}

/// One sub-field of a [`ModelSchema`]
#[derive(Debug, Clone, PartialEq)]
pub struct ModelField {
    pub name: String,
    /// External key, when it differs from `name`
    pub alias: Option<String>,
    pub annotation: Annotation,
    pub default: Option<Value>,
}

impl ModelField {
    pub fn new(name: impl Into<String>, annotation: Annotation) -> Self {
        Self {
            name: name.into(),
            alias: None,
            annotation,
            default: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Key looked up in the incoming data
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Required unless it has a default or is optional
    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.annotation.is_optional()
    }
}
