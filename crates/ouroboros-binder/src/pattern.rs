//! Handler pattern classification
//!
//! Every handler gets exactly one [`HandlerPattern`], chosen from the sources
//! its fields read. The pattern selects which specialized injector is built.

use std::fmt;

use crate::field::{FieldDefinition, Source};

/// Closed set of dispatch shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerPattern {
    NoParams,
    RequestOnly,
    PathOnly,
    QueryOnly,
    BodyOnly,
    /// Path and query fields only
    Simple,
    WithDeps,
    /// Fallback for every other combination
    Full,
}

impl HandlerPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoParams => "NO_PARAMS",
            Self::RequestOnly => "REQUEST_ONLY",
            Self::PathOnly => "PATH_ONLY",
            Self::QueryOnly => "QUERY_ONLY",
            Self::BodyOnly => "BODY_ONLY",
            Self::Simple => "SIMPLE",
            Self::WithDeps => "WITH_DEPS",
            Self::Full => "FULL",
        }
    }
}

impl fmt::Display for HandlerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse fast-path flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerMode {
    RequestOnly,
    NoParams,
    Mixed,
}

// ============================================================================
// Source summary
// ============================================================================

/// Number of fields per source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub path: usize,
    pub query: usize,
    pub header: usize,
    pub cookie: usize,
    pub body: usize,
    pub form: usize,
    pub file: usize,
    pub dependency: usize,
    pub request: usize,
}

impl SourceSummary {
    pub fn from_fields(fields: &[FieldDefinition]) -> Self {
        fields.iter().fold(Self::default(), |mut summary, field| {
            summary.add(field.source());
            summary
        })
    }

    pub fn add(&mut self, source: Source) {
        let count = match source {
            Source::Path => &mut self.path,
            Source::Query => &mut self.query,
            Source::Header => &mut self.header,
            Source::Cookie => &mut self.cookie,
            Source::Body => &mut self.body,
            Source::Form => &mut self.form,
            Source::File => &mut self.file,
            Source::Dependency => &mut self.dependency,
            Source::Request => &mut self.request,
        };
        *count += 1;
    }

    pub fn total(&self) -> usize {
        self.path
            + self.query
            + self.header
            + self.cookie
            + self.body
            + self.form
            + self.file
            + self.dependency
            + self.request
    }

    pub fn needs_form_parsing(&self) -> bool {
        self.form > 0 || self.file > 0
    }
}

/// Decision tree over the source summary
pub fn classify_summary(summary: &SourceSummary) -> HandlerPattern {
    let total = summary.total();

    if summary.dependency > 0 {
        return HandlerPattern::WithDeps;
    }
    if total == 0 {
        return HandlerPattern::NoParams;
    }
    if summary.request == 1 && total == 1 {
        return HandlerPattern::RequestOnly;
    }
    if summary.request > 0 || summary.needs_form_parsing() {
        return HandlerPattern::Full;
    }
    if summary.header > 0 || summary.cookie > 0 {
        return HandlerPattern::Full;
    }
    if summary.body == 1 && total == 1 {
        return HandlerPattern::BodyOnly;
    }
    if summary.body == 0 {
        match (summary.path > 0, summary.query > 0) {
            (true, false) => return HandlerPattern::PathOnly,
            (false, true) => return HandlerPattern::QueryOnly,
            (true, true) => return HandlerPattern::Simple,
            (false, false) => {}
        }
    }
    HandlerPattern::Full
}

/// Classify a handler's fields
pub fn classify(fields: &[FieldDefinition]) -> HandlerPattern {
    classify_summary(&SourceSummary::from_fields(fields))
}

// ============================================================================
// Flags
// ============================================================================

/// Aggregate per-handler needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerFlags {
    pub needs_path_params: bool,
    pub needs_query: bool,
    pub needs_headers: bool,
    pub needs_cookies: bool,
    pub needs_body: bool,
    pub needs_form_parsing: bool,
    pub has_file_uploads: bool,
    pub has_dependencies: bool,
    pub is_static_route: bool,
}

impl HandlerFlags {
    pub fn new(summary: &SourceSummary, is_static_route: bool) -> Self {
        Self {
            needs_path_params: summary.path > 0,
            needs_query: summary.query > 0,
            needs_headers: summary.header > 0,
            needs_cookies: summary.cookie > 0,
            needs_body: summary.body > 0,
            needs_form_parsing: summary.needs_form_parsing(),
            has_file_uploads: summary.file > 0,
            has_dependencies: summary.dependency > 0,
            is_static_route,
        }
    }
}

/// Mode for a classified handler
pub fn handler_mode(pattern: HandlerPattern) -> HandlerMode {
    match pattern {
        HandlerPattern::NoParams => HandlerMode::NoParams,
        HandlerPattern::RequestOnly => HandlerMode::RequestOnly,
        _ => HandlerMode::Mixed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(sources: &[Source]) -> SourceSummary {
        let mut summary = SourceSummary::default();
        for source in sources {
            summary.add(*source);
        }
        summary
    }

    #[test]
    fn test_basic_patterns() {
        use Source::*;
        assert_eq!(classify_summary(&summary(&[])), HandlerPattern::NoParams);
        assert_eq!(classify_summary(&summary(&[Request])), HandlerPattern::RequestOnly);
        assert_eq!(classify_summary(&summary(&[Path, Path])), HandlerPattern::PathOnly);
        assert_eq!(classify_summary(&summary(&[Query])), HandlerPattern::QueryOnly);
        assert_eq!(classify_summary(&summary(&[Body])), HandlerPattern::BodyOnly);
        assert_eq!(classify_summary(&summary(&[Path, Query])), HandlerPattern::Simple);
    }

    #[test]
    fn test_fallbacks_to_full() {
        use Source::*;
        assert_eq!(classify_summary(&summary(&[Body, Body])), HandlerPattern::Full);
        assert_eq!(classify_summary(&summary(&[Path, Body])), HandlerPattern::Full);
        assert_eq!(classify_summary(&summary(&[Query, Header])), HandlerPattern::Full);
        assert_eq!(classify_summary(&summary(&[Cookie])), HandlerPattern::Full);
        assert_eq!(classify_summary(&summary(&[Form])), HandlerPattern::Full);
        assert_eq!(classify_summary(&summary(&[File])), HandlerPattern::Full);
        assert_eq!(classify_summary(&summary(&[Request, Query])), HandlerPattern::Full);
    }

    #[test]
    fn test_dependency_wins() {
        use Source::*;
        assert_eq!(classify_summary(&summary(&[Dependency])), HandlerPattern::WithDeps);
        assert_eq!(classify_summary(&summary(&[Request, Form, Dependency])), HandlerPattern::WithDeps);
    }

    #[test]
    fn test_flags() {
        use Source::*;
        let flags = HandlerFlags::new(&summary(&[Path, File, Cookie]), false);
        assert!(flags.needs_path_params);
        assert!(flags.needs_form_parsing);
        assert!(flags.has_file_uploads);
        assert!(flags.needs_cookies);
        assert!(!flags.needs_query);
        assert!(!flags.is_static_route);
    }

    #[test]
    fn test_mode() {
        assert_eq!(handler_mode(HandlerPattern::NoParams), HandlerMode::NoParams);
        assert_eq!(handler_mode(HandlerPattern::RequestOnly), HandlerMode::RequestOnly);
        assert_eq!(handler_mode(HandlerPattern::Simple), HandlerMode::Mixed);
    }
}
