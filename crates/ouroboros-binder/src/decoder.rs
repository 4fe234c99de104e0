//! Body payload decoding
//!
//! The binder asks a [`BodyDecoder`] to turn raw body bytes into a [`Value`],
//! then validates that value against the declared annotation. The decoder is
//! configurable so a runtime can plug in another wire format, and so tests
//! can count decode calls.

use thiserror::Error;

use crate::error::{ErrorType, SourcePosition, ValidationError};
use crate::value::Value;

/// A payload that could not be decoded
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
    pub position: Option<SourcePosition>,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Convert into a body validation error
    pub fn into_validation_error(self) -> ValidationError {
        let error = ValidationError::new(
            "body",
            "",
            format!("Invalid JSON: {}", self.message),
            ErrorType::JsonInvalid,
        );
        match self.position {
            Some(position) => error.at(position),
            None => error,
        }
    }
}

/// Decodes raw body bytes into a dynamic value
pub trait BodyDecoder: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Value, DecodeError>;

    /// Name used in diagnostics
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Default decoder backed by `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl BodyDecoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value, DecodeError> {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(json) => Ok(Value::from_json(&json)),
            Err(e) => {
                let (line, column) = (e.line(), e.column());
                let message = e.to_string();
                Err(DecodeError::new(message).at(SourcePosition {
                    offset: byte_offset(body, line, column),
                    line,
                    column,
                }))
            }
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Byte offset of a 1-based line/column pair
fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = body
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    (line_start + column.saturating_sub(1)).min(body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_decoder_success() {
        let value = JsonDecoder.decode(br#"{"name":"x","price":1.5}"#).unwrap();
        assert_eq!(value.get("name"), Some(&Value::from("x")));
        assert_eq!(value.get("price"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_json_decoder_reports_position() {
        let error = JsonDecoder.decode(b"{\n  \"name\": }").unwrap_err();
        let position = error.position.unwrap();
        assert_eq!(position.line, 2);
        assert!(position.column > 0);
        assert!(position.offset > 2);
    }

    #[test]
    fn test_decode_error_into_validation_error() {
        let error = DecodeError::new("expected value")
            .at(SourcePosition { offset: 3, line: 1, column: 4 })
            .into_validation_error();
        assert_eq!(error.location, "body");
        assert_eq!(error.error_type, ErrorType::JsonInvalid);
        assert_eq!(error.position.map(|p| p.column), Some(4));
    }

    #[test]
    fn test_byte_offset() {
        assert_eq!(byte_offset(b"ab\ncd", 2, 2), 4);
        assert_eq!(byte_offset(b"ab", 1, 1), 0);
        assert_eq!(byte_offset(b"ab", 9, 9), 2);
    }
}
