//! Source inference
//!
//! Decides, once per parameter at registration, which part of the request a
//! parameter reads from. First match wins:
//!
//! 1. an explicit marker (a dependency marker always wins)
//! 2. a reserved request-alias name, or a request annotation
//! 3. a name declared as a path parameter by the route
//! 4. an upload annotation reads from `file`
//! 5. safe methods read from `query`; unsafe methods read structured types
//!    from `body` and everything else from `query`

use thiserror::Error;

use crate::config::BinderConfig;
use crate::field::Source;
use crate::handler::Marker;
use crate::http::HttpMethod;
use crate::types::Annotation;

/// A payload-reading source on a method that cannot carry a payload
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{location} parameters are not allowed on {method} requests")]
pub struct BodyNotAllowed {
    pub location: Source,
    pub method: HttpMethod,
}

/// Infer the source of one parameter
pub fn infer_source(
    name: &str,
    annotation: &Annotation,
    marker: Option<&Marker>,
    path_params: &[String],
    method: HttpMethod,
    config: &BinderConfig,
) -> Result<Source, BodyNotAllowed> {
    let source = match marker {
        Some(marker) => marker_source(marker),
        None if config.is_request_alias(name) => Source::Request,
        None if matches!(annotation, Annotation::Request) => Source::Request,
        None if path_params.iter().any(|p| p == name) => Source::Path,
        None if annotation.is_upload() => Source::File,
        None if !method.allows_body() => Source::Query,
        None if annotation.is_structured() => Source::Body,
        None => Source::Query,
    };

    if source.reads_body() && !method.allows_body() {
        return Err(BodyNotAllowed {
            location: source,
            method,
        });
    }

    Ok(source)
}

fn marker_source(marker: &Marker) -> Source {
    match marker {
        Marker::Depends(_) => Source::Dependency,
        Marker::Path => Source::Path,
        Marker::Query => Source::Query,
        Marker::Header => Source::Header,
        Marker::Cookie => Source::Cookie,
        Marker::Body => Source::Body,
        Marker::Form => Source::Form,
        Marker::File => Source::File,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelField, ModelSchema};

    fn item() -> Annotation {
        Annotation::model(ModelSchema::new("Item").field(ModelField::new("name", Annotation::string())))
    }

    fn infer(name: &str, annotation: &Annotation, marker: Option<&Marker>, method: HttpMethod) -> Result<Source, BodyNotAllowed> {
        infer_source(name, annotation, marker, &["id".to_string()], method, &BinderConfig::default())
    }

    #[test]
    fn test_marker_wins() {
        let source = infer("id", &Annotation::int(), Some(&Marker::Header), HttpMethod::Get).unwrap();
        assert_eq!(source, Source::Header);
    }

    #[test]
    fn test_request_alias() {
        assert_eq!(infer("request", &Annotation::Any, None, HttpMethod::Get), Ok(Source::Request));
        assert_eq!(infer("req", &Annotation::Any, None, HttpMethod::Post), Ok(Source::Request));
        assert_eq!(infer("r", &Annotation::Request, None, HttpMethod::Get), Ok(Source::Request));
    }

    #[test]
    fn test_configured_request_alias() {
        let config = BinderConfig::default().request_alias("ctx");
        let source = infer_source("ctx", &Annotation::Any, None, &[], HttpMethod::Get, &config);
        assert_eq!(source, Ok(Source::Request));
    }

    #[test]
    fn test_path_param_by_name() {
        assert_eq!(infer("id", &Annotation::int(), None, HttpMethod::Get), Ok(Source::Path));
        assert_eq!(infer("id", &item(), None, HttpMethod::Post), Ok(Source::Path));
    }

    #[test]
    fn test_safe_method_infers_query() {
        assert_eq!(infer("q", &Annotation::string(), None, HttpMethod::Get), Ok(Source::Query));
        assert_eq!(infer("filters", &item(), None, HttpMethod::Get), Ok(Source::Query));
        assert_eq!(infer("q", &Annotation::string(), None, HttpMethod::Delete), Ok(Source::Query));
    }

    #[test]
    fn test_unsafe_method_infers_body_for_structured() {
        assert_eq!(infer("item", &item(), None, HttpMethod::Post), Ok(Source::Body));
        assert_eq!(infer("items", &Annotation::list(item()), None, HttpMethod::Put), Ok(Source::Body));
        assert_eq!(infer("q", &Annotation::string(), None, HttpMethod::Patch), Ok(Source::Query));
    }

    #[test]
    fn test_upload_infers_file() {
        assert_eq!(infer("f", &Annotation::Upload, None, HttpMethod::Post), Ok(Source::File));
    }

    #[test]
    fn test_body_marker_on_get_rejected() {
        let error = infer("item", &item(), Some(&Marker::Body), HttpMethod::Get).unwrap_err();
        assert_eq!(error.location, Source::Body);
        assert_eq!(error.method, HttpMethod::Get);

        for method in [HttpMethod::Head, HttpMethod::Delete, HttpMethod::Options] {
            assert!(infer("f", &Annotation::string(), Some(&Marker::Form), method).is_err());
            assert!(infer("f", &Annotation::Upload, None, method).is_err());
        }
    }
}
