//! Request view handed to the binder by the serving runtime
//!
//! [`RequestParts`] is the plain data the runtime fills in. [`Request`] wraps
//! it behind an `Arc` so the same view can be bound to a handler parameter,
//! shared with dependencies, and cloned cheaply. The form view is only
//! materialized on first access.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;

use crate::http::HttpMethod;
use crate::value::Value;

/// Typed scalars keyed by parameter name (path and query)
pub type ParamMap = HashMap<String, Value>;

/// Raw text keyed by name (headers and cookies)
pub type TextMap = HashMap<String, String>;

// ============================================================================
// Form view
// ============================================================================

/// A file part pre-parsed from a multipart body
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FilePart {
    pub fn new(filename: Option<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            filename,
            content_type,
            data,
        }
    }
}

/// Form fields and file parts of a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormView {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<FilePart>>,
}

impl FormView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` body
    pub fn from_urlencoded(body: &[u8]) -> Self {
        let mut form = Self::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            form.add_field(key.into_owned(), value.into_owned());
        }
        form
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    pub fn add_file(&mut self, name: impl Into<String>, part: FilePart) {
        self.files.entry(name.into()).or_default().push(part);
    }

    /// All values submitted for a field
    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// All file parts submitted under a name
    pub fn files(&self, name: &str) -> Option<&[FilePart]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}

// ============================================================================
// Request parts
// ============================================================================

/// Parsed request data supplied by the serving runtime
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: HttpMethod,
    pub path: String,
    /// Path parameters, already converted to typed scalars
    pub path_params: ParamMap,
    /// Query parameters, already converted; repeated keys hold a list
    pub query_params: ParamMap,
    /// Headers with lowercase keys
    pub headers: TextMap,
    pub cookies: TextMap,
    pub body: Bytes,
    /// Pre-parsed multipart form, when the runtime already split the body
    pub form: Option<FormView>,
}

impl RequestParts {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: Bytes::new(),
            form: None,
        }
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter; a repeated key accumulates into a list
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        let merged = match self.query_params.remove(&name) {
            Some(Value::List(mut items)) => {
                items.push(value);
                Value::List(items)
            }
            Some(existing) => Value::List(vec![existing, value]),
            None => value,
        };
        self.query_params.insert(name, merged);
        self
    }

    /// Add a header; a `Cookie` header also fills the cookie mapping
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        let value = value.into();
        if name == "cookie" {
            self = self.with_cookie_header(&value);
        }
        self.headers.insert(name, value);
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Parse a raw `Cookie` header value (`a=1; b=2`)
    pub fn with_cookie_header(mut self, raw: &str) -> Self {
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    self.cookies
                        .insert(name.to_string(), value.trim().trim_matches('"').to_string());
                }
            }
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type
    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.get_or_insert_with(FormView::new).add_field(name, value);
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, part: FilePart) -> Self {
        self.form.get_or_insert_with(FormView::new).add_file(name, part);
        self
    }
}

// ============================================================================
// Request
// ============================================================================

#[derive(Debug)]
struct RequestInner {
    parts: RequestParts,
    form: OnceCell<FormView>,
}

/// Shared, read-only request view
#[derive(Debug, Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    pub fn new(parts: RequestParts) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                parts,
                form: OnceCell::new(),
            }),
        }
    }

    pub fn parts(&self) -> &RequestParts {
        &self.inner.parts
    }

    pub fn method(&self) -> HttpMethod {
        self.inner.parts.method
    }

    pub fn path(&self) -> &str {
        &self.inner.parts.path
    }

    pub fn path_params(&self) -> &ParamMap {
        &self.inner.parts.path_params
    }

    pub fn query_params(&self) -> &ParamMap {
        &self.inner.parts.query_params
    }

    pub fn headers(&self) -> &TextMap {
        &self.inner.parts.headers
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.parts.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn cookies(&self) -> &TextMap {
        &self.inner.parts.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.inner.parts.cookies.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.parts.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Form view, materialized on first access
    pub fn form(&self) -> &FormView {
        self.inner.form.get_or_init(|| match &self.inner.parts.form {
            Some(form) => form.clone(),
            None if self.is_urlencoded() => FormView::from_urlencoded(&self.inner.parts.body),
            None => FormView::new(),
        })
    }

    /// Whether the form view has been built yet
    pub fn form_materialized(&self) -> bool {
        self.inner.form.get().is_some()
    }

    /// Whether both values are views of the same request
    pub fn ptr_eq(&self, other: &Request) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn is_urlencoded(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }
}

impl From<RequestParts> for Request {
    fn from(parts: RequestParts) -> Self {
        Self::new(parts)
    }
}
