//! Validation and coercion of bound values
//!
//! Path and query values arrive already typed, so they are only validated.
//! Header, cookie and form values are raw text and are first coerced to the
//! declared scalar type with [`coerce_text`]. Validation accumulates every
//! error instead of stopping at the first one.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ErrorType, ValidationError, ValidationErrors};
use crate::types::{Annotation, ModelSchema, NumericConstraints, StringConstraints, StringFormat};
use crate::value::Value;

// ============================================================================
// Pre-compiled Regex Patterns
// ============================================================================

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern")
});

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern")
});

static DATETIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{1,9})?(Z|[+-]\d{2}:\d{2})?$")
        .expect("datetime pattern")
});

static DATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern"));

// ============================================================================
// Validation Context
// ============================================================================

/// Tracks where in a request the value under validation lives
#[derive(Debug, Clone)]
pub struct ValidationContext {
    location: String,
    path: Vec<String>,
}

impl ValidationContext {
    /// Context rooted at a request location ("query", "body", ...)
    pub fn with_location(location: &str) -> Self {
        Self {
            location: location.to_string(),
            path: Vec::new(),
        }
    }

    pub fn push(&mut self, segment: &str) {
        self.path.push(segment.to_string());
    }

    pub fn pop(&mut self) {
        self.path.pop();
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Dotted field path below the location (e.g. "filters.limit")
    pub fn field(&self) -> String {
        self.path.join(".")
    }

    fn type_error(&self, expected: &str, value: &Value) -> ValidationError {
        ValidationError::type_error(
            self.location.as_str(),
            self.field(),
            format!("Expected {}, got {}", expected, value.type_name()),
        )
    }

    fn value_error(&self, message: String) -> ValidationError {
        ValidationError::value_error(self.location.as_str(), self.field(), message)
    }
}

// ============================================================================
// Core Validation Function
// ============================================================================

/// Validate a value against an annotation.
///
/// Returns the normalized value (integers widened for float annotations,
/// model members renamed from external keys to field names, defaults filled).
/// Errors are accumulated into `errors`; the returned value is only
/// meaningful when none were added.
pub fn validate_value(
    value: &Value,
    annotation: &Annotation,
    ctx: &mut ValidationContext,
    errors: &mut ValidationErrors,
) -> Value {
    match annotation {
        Annotation::Any => value.clone(),
        Annotation::String(constraints) => {
            validate_string(value, constraints, ctx, errors);
            value.clone()
        }
        Annotation::Int(constraints) => {
            match value {
                Value::Int(n) => validate_range(*n, constraints, ctx, errors),
                _ => errors.add(ctx.type_error("integer", value)),
            }
            value.clone()
        }
        Annotation::Float(constraints) => {
            let num = match value {
                Value::Float(f) => *f,
                Value::Int(i) => *i as f64,
                _ => {
                    errors.add(ctx.type_error("number", value));
                    return value.clone();
                }
            };
            validate_range(num, constraints, ctx, errors);
            Value::Float(num)
        }
        Annotation::Bool => {
            if !matches!(value, Value::Bool(_)) {
                errors.add(ctx.type_error("boolean", value));
            }
            value.clone()
        }
        Annotation::Bytes => match value {
            Value::Bytes(_) => value.clone(),
            Value::String(s) => Value::Bytes(s.clone().into_bytes()),
            _ => {
                errors.add(ctx.type_error("bytes", value));
                value.clone()
            }
        },
        Annotation::List(items) => match value {
            Value::List(values) => Value::List(
                values
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        ctx.push(&index.to_string());
                        let item = validate_value(item, items, ctx, errors);
                        ctx.pop();
                        item
                    })
                    .collect(),
            ),
            _ => {
                errors.add(ctx.type_error("array", value));
                value.clone()
            }
        },
        Annotation::Optional(inner) => {
            if value.is_null() {
                Value::Null
            } else {
                validate_value(value, inner, ctx, errors)
            }
        }
        Annotation::Model(schema) => validate_model(value, schema, ctx, errors),
        Annotation::Upload | Annotation::Request => {
            errors.add(ctx.type_error(annotation.type_name(), value));
            value.clone()
        }
    }
}

/// Validate an object against a model schema, collecting every field error
pub fn validate_model(
    value: &Value,
    schema: &ModelSchema,
    ctx: &mut ValidationContext,
    errors: &mut ValidationErrors,
) -> Value {
    let Value::Object(pairs) = value else {
        errors.add(ctx.type_error("object", value));
        return value.clone();
    };

    let lookup: HashMap<&str, &Value> = pairs.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let mut out = Vec::with_capacity(schema.fields.len());

    for field in &schema.fields {
        ctx.push(field.key());
        match lookup.get(field.key()) {
            Some(member) => {
                let member = validate_value(member, &field.annotation, ctx, errors);
                out.push((field.name.clone(), member));
            }
            None => match &field.default {
                Some(default) => out.push((field.name.clone(), default.clone())),
                None if field.annotation.is_optional() => out.push((field.name.clone(), Value::Null)),
                None => errors.add(ValidationError::missing(ctx.location(), ctx.field())),
            },
        }
        ctx.pop();
    }

    Value::Object(out)
}

// ============================================================================
// String / Numeric
// ============================================================================

fn validate_string(
    value: &Value,
    constraints: &StringConstraints,
    ctx: &ValidationContext,
    errors: &mut ValidationErrors,
) {
    let Value::String(s) = value else {
        errors.add(ctx.type_error("string", value));
        return;
    };

    // Length in characters, not bytes
    let char_count = s.chars().count();

    if let Some(min) = constraints.min_length {
        if char_count < min {
            errors.add(ctx.value_error(format!(
                "String must be at least {} characters (got {})",
                min, char_count
            )));
        }
    }

    if let Some(max) = constraints.max_length {
        if char_count > max {
            errors.add(ctx.value_error(format!(
                "String must be at most {} characters (got {})",
                max, char_count
            )));
        }
    }

    // Registered handlers have every pattern compiled already
    if let Some(pattern) = &constraints.pattern {
        match pattern.regex() {
            Ok(re) if re.is_match(s) => {}
            Ok(_) => errors.add(ctx.value_error(format!("String does not match pattern: {}", pattern.as_str()))),
            Err(_) => errors.add(ctx.value_error(format!("Invalid regex pattern: {}", pattern.as_str()))),
        }
    }

    if let Some(format) = constraints.format {
        let (is_valid, format_name) = match format {
            StringFormat::Email => (EMAIL_REGEX.is_match(s), "email"),
            StringFormat::Uuid => (UUID_REGEX.is_match(s), "UUID"),
            StringFormat::DateTime => (DATETIME_REGEX.is_match(s), "datetime (ISO 8601)"),
            StringFormat::Date => (DATE_REGEX.is_match(s), "date (YYYY-MM-DD)"),
        };
        if !is_valid {
            errors.add(ValidationError::new(
                ctx.location(),
                ctx.field(),
                format!("Invalid {} format", format_name),
                ErrorType::FormatError,
            ));
        }
    }
}

fn validate_range<T>(
    value: T,
    constraints: &NumericConstraints<T>,
    ctx: &ValidationContext,
    errors: &mut ValidationErrors,
) where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if let Some(min) = constraints.minimum {
        if value < min {
            errors.add(ctx.value_error(format!("Value must be >= {} (got {})", min, value)));
        }
    }

    if let Some(max) = constraints.maximum {
        if value > max {
            errors.add(ctx.value_error(format!("Value must be <= {} (got {})", max, value)));
        }
    }
}

// ============================================================================
// Text Coercion
// ============================================================================

/// Convert raw text (header, cookie, form value) towards the declared type.
///
/// Text that does not parse is returned unchanged as a string so validation
/// reports a type error for it.
pub fn coerce_text(text: &str, annotation: &Annotation) -> Value {
    match annotation.unwrap_optional() {
        Annotation::Int(_) => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Annotation::Float(_) => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Annotation::Bool => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Value::Bool(true),
            "false" | "0" | "no" | "off" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        Annotation::Bytes => Value::Bytes(text.as_bytes().to_vec()),
        Annotation::List(items) => Value::List(vec![coerce_text(text, items)]),
        _ => Value::String(text.to_string()),
    }
}

/// Coerce every value of a repeated key.
///
/// List annotations take all values; scalars take the last one.
pub fn coerce_texts(texts: &[String], annotation: &Annotation) -> Option<Value> {
    match annotation.unwrap_optional() {
        Annotation::List(items) => Some(Value::List(
            texts.iter().map(|text| coerce_text(text, items)).collect(),
        )),
        _ => texts.last().map(|text| coerce_text(text, annotation)),
    }
}
