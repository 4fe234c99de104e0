//! Extractor factory
//!
//! One builder per source. Each produces a small closure over exactly the
//! request sub-view it needs (path parameters, query mapping, headers,
//! cookies, body, form). Everything that can be decided at registration time
//! (lookup key, header normalization, model key mapping, fallback value) is
//! captured in the closure so requests only do lookups and validation.

use std::fmt;
use std::sync::Arc;

use crate::config::BinderConfig;
use crate::decoder::BodyDecoder;
use crate::error::{ApiResult, ValidationError, ValidationErrors};
use crate::field::Source;
use crate::request::{FormView, ParamMap, Request, TextMap};
use crate::scope::RequestScope;
use crate::types::{Annotation, ModelSchema};
use crate::upload::{UploadConfig, UploadFile};
use crate::validators::{coerce_text, coerce_texts, validate_value, ValidationContext};
use crate::value::{Arg, Value};

pub type ParamFn = Arc<dyn Fn(&ParamMap) -> ApiResult<Arg> + Send + Sync>;
pub type TextFn = Arc<dyn Fn(&TextMap) -> ApiResult<Arg> + Send + Sync>;
pub type BodyFn = Arc<dyn Fn(&Request, &RequestScope) -> ApiResult<Arg> + Send + Sync>;
pub type FormFn = Arc<dyn Fn(&FormView, &RequestScope) -> ApiResult<Arg> + Send + Sync>;

// ============================================================================
// Extractor
// ============================================================================

/// A compiled extraction closure, tagged by the sub-view it reads
#[derive(Clone)]
pub enum Extractor {
    Path(ParamFn),
    Query(ParamFn),
    Header(TextFn),
    Cookie(TextFn),
    Body(BodyFn),
    Form(FormFn),
    File(FormFn),
}

impl Extractor {
    pub fn source(&self) -> Source {
        match self {
            Self::Path(_) => Source::Path,
            Self::Query(_) => Source::Query,
            Self::Header(_) => Source::Header,
            Self::Cookie(_) => Source::Cookie,
            Self::Body(_) => Source::Body,
            Self::Form(_) => Source::Form,
            Self::File(_) => Source::File,
        }
    }

    /// Run against a full request, selecting the sub-view for this source
    pub fn apply(&self, request: &Request, scope: &RequestScope) -> ApiResult<Arg> {
        match self {
            Self::Path(f) => f(request.path_params()),
            Self::Query(f) => f(request.query_params()),
            Self::Header(f) => f(request.headers()),
            Self::Cookie(f) => f(request.cookies()),
            Self::Body(f) => f(request, scope),
            Self::Form(f) | Self::File(f) => f(request.form(), scope),
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extractor({})", self.source())
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Everything the factory needs to know about one parameter
#[derive(Debug, Clone, Copy)]
pub struct ExtractorInput<'a> {
    pub source: Source,
    /// External key (alias or name)
    pub key: &'a str,
    pub annotation: &'a Annotation,
    pub default: Option<&'a Value>,
    /// Body only: bind the payload member named `key` instead of the whole payload
    pub embed: bool,
}

/// Build the extractor for one parameter.
///
/// Returns None for dependency and request sources, which have no extractor.
pub fn build_extractor(input: ExtractorInput<'_>, config: &BinderConfig) -> Option<Extractor> {
    let fallback = Fallback {
        location: input.source,
        key: match input.source {
            Source::Header => header_key(input.key),
            _ => input.key.to_string(),
        },
        default: input.default.cloned(),
        optional: input.annotation.is_optional(),
    };
    let annotation = input.annotation.clone();

    let extractor = match input.source {
        Source::Path => Extractor::Path(typed_extractor(annotation, fallback)),
        Source::Query => Extractor::Query(typed_extractor(annotation, fallback)),
        Source::Header => Extractor::Header(text_extractor(annotation, fallback, header_key)),
        Source::Cookie => Extractor::Cookie(text_extractor(annotation, fallback, str::to_string)),
        Source::Body => Extractor::Body(body_extractor(annotation, fallback, input.embed, Arc::clone(&config.decoder))),
        Source::Form => Extractor::Form(form_extractor(annotation, fallback)),
        Source::File => Extractor::File(file_extractor(annotation, fallback, config.upload.clone())),
        Source::Dependency | Source::Request => return None,
    };
    Some(extractor)
}

/// Canonical header key: lowercase, underscores as hyphens
pub fn header_key(key: &str) -> String {
    key.to_ascii_lowercase().replace('_', "-")
}

// ============================================================================
// Per-source builders
// ============================================================================

/// Path and query values arrive typed; they are validated, never re-parsed
fn typed_extractor(annotation: Annotation, fallback: Fallback) -> ParamFn {
    let location = fallback.location;

    if let Some(schema) = annotation.model_schema() {
        let plan = ModelPlan::new(schema, location, str::to_string);
        return Arc::new(move |params: &ParamMap| {
            plan.extract(|key, item| params.get(key).map(|v| wrap_list(v, item)), &fallback)
        });
    }

    Arc::new(move |params: &ParamMap| match params.get(&fallback.key) {
        Some(value) => check(&wrap_list(value, &annotation), &annotation, location, &fallback.key),
        None => fallback.resolve(),
    })
}

/// Header and cookie values arrive as text and are coerced first
fn text_extractor(annotation: Annotation, fallback: Fallback, normalize: fn(&str) -> String) -> TextFn {
    let location = fallback.location;

    if let Some(schema) = annotation.model_schema() {
        let plan = ModelPlan::new(schema, location, normalize);
        return Arc::new(move |texts: &TextMap| {
            plan.extract(|key, item| texts.get(key).map(|t| coerce_text(t, item)), &fallback)
        });
    }

    Arc::new(move |texts: &TextMap| match texts.get(&fallback.key) {
        Some(text) => check(&coerce_text(text, &annotation), &annotation, location, &fallback.key),
        None => fallback.resolve(),
    })
}

fn body_extractor(
    annotation: Annotation,
    fallback: Fallback,
    embed: bool,
    decoder: Arc<dyn BodyDecoder>,
) -> BodyFn {
    // A lone bytes parameter receives the raw payload undecoded
    let raw = !embed && matches!(annotation.unwrap_optional(), Annotation::Bytes);

    Arc::new(move |request: &Request, scope: &RequestScope| {
        if raw {
            return match request.body() {
                body if body.is_empty() => fallback.resolve(),
                body => Ok(Arg::Value(Value::Bytes(body.to_vec()))),
            };
        }

        let payload = scope.decoded_body(|| decode_payload(decoder.as_ref(), request.body()))?;
        let (value, field) = if embed {
            (payload.and_then(|p| p.get(&fallback.key)), fallback.key.as_str())
        } else {
            (payload, "")
        };

        match value {
            Some(value) => check(value, &annotation, Source::Body, field),
            None => fallback.resolve(),
        }
    })
}

fn form_extractor(annotation: Annotation, fallback: Fallback) -> FormFn {
    if let Some(schema) = annotation.model_schema() {
        let plan = ModelPlan::new(schema, Source::Form, str::to_string);
        return Arc::new(move |form: &FormView, _: &RequestScope| {
            plan.extract(|key, item| form.field(key).and_then(|t| coerce_texts(t, item)), &fallback)
        });
    }

    Arc::new(move |form: &FormView, _: &RequestScope| {
        match form.field(&fallback.key).and_then(|texts| coerce_texts(texts, &annotation)) {
            Some(value) => check(&value, &annotation, Source::Form, &fallback.key),
            None => fallback.resolve(),
        }
    })
}

/// Produces upload handles and records them on the scope for release
fn file_extractor(annotation: Annotation, fallback: Fallback, limits: UploadConfig) -> FormFn {
    let many = annotation.is_list();

    Arc::new(move |form: &FormView, scope: &RequestScope| {
        let parts = match form.files(&fallback.key) {
            Some(parts) if !parts.is_empty() => parts,
            _ => return fallback.resolve(),
        };

        let mut errors = ValidationErrors::new();
        for part in parts {
            if let Err(error) = limits.check(part, &fallback.key) {
                errors.add(error);
            }
        }
        errors.into_result()?;

        let mut handles: Vec<UploadFile> = parts.iter().map(UploadFile::from_part).collect();
        for handle in &handles {
            scope.track_upload(handle);
        }

        if many {
            return Ok(Arg::Uploads(handles));
        }
        // a single-file parameter binds the last part
        match handles.pop() {
            Some(last) => Ok(Arg::Upload(last)),
            None => fallback.resolve(),
        }
    })
}

// ============================================================================
// Shared helpers
// ============================================================================

/// What a missing value binds to
#[derive(Debug, Clone)]
struct Fallback {
    location: Source,
    key: String,
    default: Option<Value>,
    optional: bool,
}

impl Fallback {
    fn is_required(&self) -> bool {
        self.default.is_none() && !self.optional
    }

    fn resolve(&self) -> ApiResult<Arg> {
        match &self.default {
            Some(default) => Ok(Arg::Value(default.clone())),
            None if self.optional => Ok(Arg::Value(Value::Null)),
            None => Err(ValidationError::missing(self.location.as_str(), self.key.as_str()).into()),
        }
    }
}

/// Validate one value and wrap it as an argument
fn check(value: &Value, annotation: &Annotation, location: Source, field: &str) -> ApiResult<Arg> {
    let mut ctx = ValidationContext::with_location(location.as_str());
    if !field.is_empty() {
        ctx.push(field);
    }
    let mut errors = ValidationErrors::new();
    let value = validate_value(value, annotation, &mut ctx, &mut errors);
    errors.into_result()?;
    Ok(Arg::Value(value))
}

/// A single value given for a list parameter becomes a one-item list
fn wrap_list(value: &Value, annotation: &Annotation) -> Value {
    match value {
        Value::List(_) | Value::Null => value.clone(),
        _ if annotation.is_list() => Value::List(vec![value.clone()]),
        _ => value.clone(),
    }
}

fn decode_payload(decoder: &dyn BodyDecoder, body: &[u8]) -> Result<Option<Value>, ValidationErrors> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    decoder
        .decode(body)
        .map(Some)
        .map_err(|e| ValidationErrors::single(e.into_validation_error()))
}

// ============================================================================
// Structured parameters
// ============================================================================

#[derive(Debug, Clone)]
struct ModelEntry {
    /// Key looked up in the sub-view
    key: String,
    /// Field name in the bound object
    name: String,
    annotation: Annotation,
    default: Option<Value>,
}

/// Precomputed key mapping for a parameter bundling several sub-fields
#[derive(Debug, Clone)]
struct ModelPlan {
    location: Source,
    entries: Vec<ModelEntry>,
}

impl ModelPlan {
    fn new(schema: &ModelSchema, location: Source, normalize: fn(&str) -> String) -> Self {
        let entries = schema
            .fields
            .iter()
            .map(|field| ModelEntry {
                key: normalize(field.key()),
                name: field.name.clone(),
                annotation: field.annotation.clone(),
                default: field.default.clone(),
            })
            .collect();
        Self { location, entries }
    }

    fn extract<F>(&self, lookup: F, fallback: &Fallback) -> ApiResult<Arg>
    where
        F: Fn(&str, &Annotation) -> Option<Value>,
    {
        let gathered: Vec<Option<Value>> = self
            .entries
            .iter()
            .map(|entry| lookup(&entry.key, &entry.annotation))
            .collect();

        if !fallback.is_required() && gathered.iter().all(Option::is_none) {
            return fallback.resolve();
        }

        match self.bind_fast(&gathered) {
            Some(value) => Ok(Arg::Value(value)),
            None => self.bind_collecting(&gathered).map(Arg::Value).map_err(Into::into),
        }
    }

    /// One pass that gives up at the first problem
    fn bind_fast(&self, gathered: &[Option<Value>]) -> Option<Value> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut scratch = ValidationErrors::new();

        for (entry, value) in self.entries.iter().zip(gathered) {
            let bound = match value {
                Some(value) => {
                    let mut ctx = ValidationContext::with_location(self.location.as_str());
                    let bound = validate_value(value, &entry.annotation, &mut ctx, &mut scratch);
                    if !scratch.is_empty() {
                        return None;
                    }
                    bound
                }
                None => self.missing_value(entry)?,
            };
            out.push((entry.name.clone(), bound));
        }

        Some(Value::Object(out))
    }

    /// Field-by-field pass reporting every error
    fn bind_collecting(&self, gathered: &[Option<Value>]) -> Result<Value, ValidationErrors> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut errors = ValidationErrors::new();

        for (entry, value) in self.entries.iter().zip(gathered) {
            let mut ctx = ValidationContext::with_location(self.location.as_str());
            ctx.push(&entry.key);
            match value {
                Some(value) => {
                    let bound = validate_value(value, &entry.annotation, &mut ctx, &mut errors);
                    out.push((entry.name.clone(), bound));
                }
                None => match self.missing_value(entry) {
                    Some(bound) => out.push((entry.name.clone(), bound)),
                    None => errors.add(ValidationError::missing(ctx.location(), ctx.field())),
                },
            }
        }

        errors.into_result().map(|()| Value::Object(out))
    }

    fn missing_value(&self, entry: &ModelEntry) -> Option<Value> {
        match &entry.default {
            Some(default) => Some(default.clone()),
            None if entry.annotation.is_optional() => Some(Value::Null),
            None => None,
        }
    }
}
