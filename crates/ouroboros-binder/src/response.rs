//! Response serialization hook
//!
//! Dispatch ends by turning the handler's result (or the error that stopped
//! it) into `(status_code, response_descriptor, body_bytes)`. The conversion
//! is a trait so a runtime can plug in its own encoder.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::value::{Arg, Value};

// ============================================================================
// Core Types
// ============================================================================

/// Everything about a response except its status and body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseDescriptor {
    pub content_type: Option<String>,
    /// Response headers (lowercase keys)
    pub headers: HashMap<String, String>,
}

impl ResponseDescriptor {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            headers: HashMap::new(),
        }
    }

    /// Add header (builder pattern)
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }
}

/// Fully serialized response handed back to the serving runtime
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status_code: u16,
    pub descriptor: ResponseDescriptor,
    pub body: Bytes,
}

impl DispatchResponse {
    pub fn new(status_code: u16, descriptor: ResponseDescriptor, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            descriptor,
            body: body.into(),
        }
    }

    /// JSON response (200 OK)
    pub fn json(value: &serde_json::Value) -> ApiResult<Self> {
        let body = serde_json::to_vec(value).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(Self::new(200, ResponseDescriptor::with_content_type("application/json"), body))
    }

    /// Plain text response (200 OK)
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(
            200,
            ResponseDescriptor::with_content_type("text/plain; charset=utf-8"),
            body.into(),
        )
    }

    /// Set status code (builder pattern)
    pub fn status(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    pub fn into_parts(self) -> (u16, ResponseDescriptor, Bytes) {
        (self.status_code, self.descriptor, self.body)
    }
}

// ============================================================================
// Serializers
// ============================================================================

/// Converts handler results and errors into responses
pub trait ResponseSerializer: Send + Sync {
    fn serialize(&self, result: &Arg) -> ApiResult<DispatchResponse>;

    /// Must not fail: this is the last stop for every error
    fn serialize_error(&self, error: &ApiError) -> DispatchResponse;
}

/// Default serializer: JSON bodies, Pydantic-style 422 detail lists
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl ResponseSerializer for JsonSerializer {
    fn serialize(&self, result: &Arg) -> ApiResult<DispatchResponse> {
        match result {
            Arg::Value(Value::Bytes(bytes)) => Ok(DispatchResponse::new(
                200,
                ResponseDescriptor::with_content_type("application/octet-stream"),
                bytes.clone(),
            )),
            Arg::Value(value) => DispatchResponse::json(&value.to_json()),
            Arg::Object(_) => {
                if let Some(response) = result.downcast_ref::<DispatchResponse>() {
                    Ok(response.clone())
                } else if let Some(value) = result.downcast_ref::<serde_json::Value>() {
                    DispatchResponse::json(value)
                } else if let Some(text) = result.downcast_ref::<String>() {
                    Ok(DispatchResponse::text(text.clone()))
                } else {
                    Err(ApiError::Serialization("Unsupported handler result object".to_string()))
                }
            }
            Arg::Request(_) | Arg::Upload(_) | Arg::Uploads(_) => Err(ApiError::Serialization(format!(
                "Handler result {:?} cannot be serialized",
                result
            ))),
        }
    }

    fn serialize_error(&self, error: &ApiError) -> DispatchResponse {
        let body = match error {
            ApiError::Validation(errors) => json!({ "detail": errors.to_detail() }),
            _ => json!({ "detail": "Internal Server Error" }),
        };
        DispatchResponse::new(
            error.status_code(),
            ResponseDescriptor::with_content_type("application/json"),
            body.to_string(),
        )
    }
}
