//! Parameter descriptors
//!
//! A [`FieldDefinition`] is assembled in one step by [`FieldDefinitionBuilder`]
//! and is immutable afterwards. Every handler parameter gets exactly one.

use std::fmt;

use crate::dependency::DependencySpec;
use crate::error::BinderError;
use crate::extractors::Extractor;
use crate::handler::ParamKind;
use crate::types::Annotation;
use crate::value::Value;

// ============================================================================
// Source
// ============================================================================

/// Where a parameter's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    Form,
    File,
    Dependency,
    Request,
}

impl Source {
    /// Location name used in error reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
            Self::Form => "form",
            Self::File => "file",
            Self::Dependency => "dependency",
            Self::Request => "request",
        }
    }

    /// Sources that read the request payload
    pub fn reads_body(&self) -> bool {
        matches!(self, Self::Body | Self::Form | Self::File)
    }

    /// Sources served by a compiled extractor
    pub fn has_extractor(&self) -> bool {
        !matches!(self, Self::Dependency | Self::Request)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an argument is handed to the callable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Positional,
    Keyword,
}

impl From<ParamKind> for PassKind {
    fn from(kind: ParamKind) -> Self {
        match kind {
            ParamKind::PositionalOnly => PassKind::Positional,
            ParamKind::PositionalOrKeyword | ParamKind::KeywordOnly => PassKind::Keyword,
        }
    }
}

// ============================================================================
// FieldDefinition
// ============================================================================

/// Compiled descriptor of one handler parameter
#[derive(Clone)]
pub struct FieldDefinition {
    name: String,
    source: Source,
    annotation: Annotation,
    alias: Option<String>,
    default: Option<Value>,
    kind: ParamKind,
    extractor: Option<Extractor>,
    dependency: Option<DependencySpec>,
}

impl FieldDefinition {
    pub fn builder(name: impl Into<String>, source: Source, annotation: Annotation) -> FieldDefinitionBuilder {
        FieldDefinitionBuilder {
            name: name.into(),
            source,
            annotation,
            alias: None,
            default: None,
            kind: ParamKind::default(),
            extractor: None,
            dependency: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// External key: alias, else name
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.annotation.is_optional()
    }

    /// Missing values are an error only for required fields
    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.is_optional()
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn pass_kind(&self) -> PassKind {
        self.kind.into()
    }

    pub fn extractor(&self) -> Option<&Extractor> {
        self.extractor.as_ref()
    }

    pub fn dependency(&self) -> Option<&DependencySpec> {
        self.dependency.as_ref()
    }
}

impl PartialEq for FieldDefinition {
    /// Structural equality; extractors compare by the source they read
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.source == other.source
            && self.annotation == other.annotation
            && self.alias == other.alias
            && self.default == other.default
            && self.kind == other.kind
            && self.extractor.as_ref().map(Extractor::source) == other.extractor.as_ref().map(Extractor::source)
            && self.dependency == other.dependency
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("annotation", &self.annotation)
            .field("alias", &self.alias)
            .field("default", &self.default)
            .field("kind", &self.kind)
            .field("extractor", &self.extractor)
            .field("dependency", &self.dependency)
            .finish()
    }
}

/// Builder for [`FieldDefinition`]
pub struct FieldDefinitionBuilder {
    name: String,
    source: Source,
    annotation: Annotation,
    alias: Option<String>,
    default: Option<Value>,
    kind: ParamKind,
    extractor: Option<Extractor>,
    dependency: Option<DependencySpec>,
}

impl FieldDefinitionBuilder {
    pub fn alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    pub fn default(mut self, default: Option<Value>) -> Self {
        self.default = default;
        self
    }

    pub fn kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn dependency(mut self, dependency: DependencySpec) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Check the parts agree with the source and freeze the descriptor
    pub fn build(self, handler: &str) -> Result<FieldDefinition, BinderError> {
        let invalid = |reason: String| BinderError::InvalidParameter {
            handler: handler.to_string(),
            param: self.name.clone(),
            reason,
        };

        match self.source {
            Source::Request if self.extractor.is_some() || self.dependency.is_some() => {
                return Err(invalid("binds the request and cannot have an extractor".to_string()));
            }
            Source::Dependency if self.dependency.is_none() || self.extractor.is_some() => {
                return Err(invalid("is a dependency but has no compiled dependency".to_string()));
            }
            source if source.has_extractor() => match &self.extractor {
                Some(extractor) if extractor.source() == source && self.dependency.is_none() => {}
                _ => return Err(invalid(format!("needs a {} extractor", source))),
            },
            _ => {}
        }

        Ok(FieldDefinition {
            name: self.name,
            source: self.source,
            annotation: self.annotation,
            alias: self.alias,
            default: self.default,
            kind: self.kind,
            extractor: self.extractor,
            dependency: self.dependency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinderConfig;
    use crate::extractors::{build_extractor, ExtractorInput};

    fn query_extractor(key: &str) -> Extractor {
        let annotation = Annotation::string();
        build_extractor(
            ExtractorInput {
                source: Source::Query,
                key,
                annotation: &annotation,
                default: None,
                embed: false,
            },
            &BinderConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_pass_kind_from_param_kind() {
        assert_eq!(PassKind::from(ParamKind::PositionalOnly), PassKind::Positional);
        assert_eq!(PassKind::from(ParamKind::PositionalOrKeyword), PassKind::Keyword);
        assert_eq!(PassKind::from(ParamKind::KeywordOnly), PassKind::Keyword);
    }

    #[test]
    fn test_build_query_field() {
        let field = FieldDefinition::builder("q", Source::Query, Annotation::optional(Annotation::string()))
            .default(Some(Value::from("all")))
            .extractor(query_extractor("q"))
            .build("search")
            .unwrap();

        assert_eq!(field.key(), "q");
        assert!(!field.is_required());
        assert_eq!(field.pass_kind(), PassKind::Keyword);
    }

    #[test]
    fn test_build_rejects_missing_extractor() {
        let error = FieldDefinition::builder("q", Source::Query, Annotation::string())
            .build("search")
            .unwrap_err();
        assert!(matches!(error, BinderError::InvalidParameter { .. }));
    }

    #[test]
    fn test_build_rejects_mismatched_extractor() {
        let result = FieldDefinition::builder("id", Source::Path, Annotation::int())
            .extractor(query_extractor("id"))
            .build("get_item");
        assert!(result.is_err());
    }

    #[test]
    fn test_build_request_field() {
        let field = FieldDefinition::builder("request", Source::Request, Annotation::Request)
            .build("raw")
            .unwrap();
        assert!(field.extractor().is_none());
        assert!(field.dependency().is_none());
    }

    #[test]
    fn test_structural_equality() {
        let build = || {
            FieldDefinition::builder("q", Source::Query, Annotation::string())
                .extractor(query_extractor("q"))
                .build("search")
                .unwrap()
        };
        assert_eq!(build(), build());
    }
}
