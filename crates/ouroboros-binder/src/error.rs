//! Binder error types
//!
//! Two families of errors exist:
//! - [`BinderError`]: raised while compiling a handler at registration time.
//!   A route whose binder fails to compile never goes live.
//! - [`ApiError`]: raised per request. Binding failures carry a
//!   Pydantic-compatible [`ValidationErrors`] list and map to 422.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::handler::HandlerId;
use crate::http::HttpMethod;

/// Per-request result type
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Per-request errors
// ============================================================================

/// Errors raised while binding a request or invoking a handler
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 422,
            ApiError::Handler(_) | ApiError::Serialization(_) | ApiError::Internal(_) => 500,
        }
    }

    /// Whether this error is a binding failure caused by the client
    pub fn is_binding_error(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    /// Validation errors, if this is a binding failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ApiError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::Validation(ValidationErrors::single(error))
    }
}

// ============================================================================
// Validation errors
// ============================================================================

/// Collection of validation errors (Pydantic-compatible format)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Collection holding exactly one error
    pub fn single(error: ValidationError) -> Self {
        Self { errors: vec![error] }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    /// Ok if no errors were collected
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn as_slice(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Render as the `detail` array of a 422 response body
    pub fn to_detail(&self) -> Vec<ErrorDetail> {
        self.errors.iter().map(ValidationError::to_detail).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())
    }
}

impl std::error::Error for ValidationErrors {}

/// Single validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Location: "path", "query", "header", "cookie", "body", "form", "file"
    pub location: String,
    /// External key, dotted for nested values (e.g. "filters.limit")
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Error classification
    pub error_type: ErrorType,
    /// Position inside a malformed payload, when the decoder reports one
    pub position: Option<SourcePosition>,
}

impl ValidationError {
    pub fn new(
        location: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
        error_type: ErrorType,
    ) -> Self {
        Self {
            location: location.into(),
            field: field.into(),
            message: message.into(),
            error_type,
            position: None,
        }
    }

    /// Required value absent from its source
    pub fn missing(location: impl Into<String>, field: impl Into<String>) -> Self {
        let location = location.into();
        let field = field.into();
        let message = format!("Missing required {} parameter '{}'", location, field);
        Self::new(location, field, message, ErrorType::Missing)
    }

    pub fn type_error(location: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(location, field, message, ErrorType::TypeError)
    }

    pub fn value_error(location: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(location, field, message, ErrorType::ValueError)
    }

    /// Attach a payload position
    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    pub fn to_detail(&self) -> ErrorDetail {
        let mut loc = vec![self.location.clone()];
        loc.extend(
            self.field
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
        );
        ErrorDetail {
            loc,
            msg: self.message.clone(),
            error_type: self.error_type.to_string(),
            position: self.position,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {} [{}]", self.location, self.field, self.message, self.error_type)
    }
}

/// Serialized form of a validation error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
}

/// Classification of validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Required value missing
    Missing,
    /// Type mismatch (e.g. expected integer, got string)
    TypeError,
    /// Constraint violation (length, range, upload limits)
    ValueError,
    /// Invalid string format (email, uuid, date)
    FormatError,
    /// Body payload could not be decoded
    JsonInvalid,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::TypeError => write!(f, "type_error"),
            Self::ValueError => write!(f, "value_error"),
            Self::FormatError => write!(f, "format_error"),
            Self::JsonInvalid => write!(f, "json_invalid"),
        }
    }
}

/// Location of a decode failure inside the raw payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcePosition {
    /// Byte offset from the start of the payload
    pub offset: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

// ============================================================================
// Registration-time errors
// ============================================================================

/// Errors raised while compiling a handler binder
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BinderError {
    #[error("handler '{handler}': parameter '{param}' reads from {location}, but {method} requests cannot carry a body")]
    BodyNotAllowed {
        handler: String,
        param: String,
        location: String,
        method: HttpMethod,
    },

    #[error("handler '{handler}': parameter '{param}' is declared more than once")]
    DuplicateParameter { handler: String, param: String },

    #[error("handler '{handler}': parameter '{param}' {reason}")]
    InvalidParameter {
        handler: String,
        param: String,
        reason: String,
    },

    #[error("route pattern '{pattern}' is malformed: {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("handler {0} is already registered")]
    DuplicateRoute(HandlerId),
}
