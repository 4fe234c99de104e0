//! Binder compiler
//!
//! Runs once per route at registration:
//! 1. parse the route pattern
//! 2. infer every parameter's source and reject illegal declarations
//! 3. build extractors and compile dependencies (recursively)
//! 4. freeze the field descriptors, compute flags, classify the pattern
//! 5. compose the injector
//!
//! The result, [`HandlerMetadata`], is immutable and shared read-only by
//! every request task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::BinderConfig;
use crate::dependency::{CompiledDependency, DependencySpec};
use crate::error::BinderError;
use crate::extractors::{build_extractor, ExtractorInput};
use crate::field::{FieldDefinition, Source};
use crate::handler::{Depends, Handler, HandlerId, Marker};
use crate::http::{HttpMethod, RoutePattern};
use crate::inference::infer_source;
use crate::injector::{compile_argument_injector, Injector};
use crate::pattern::{classify_summary, handler_mode, HandlerFlags, HandlerMode, HandlerPattern, SourceSummary};

// ============================================================================
// Metadata
// ============================================================================

/// Everything the binder learned about one handler on one route
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerBinding {
    pub handler_id: HandlerId,
    pub handler_name: String,
    pub method: HttpMethod,
    pub route: RoutePattern,
    pub fields: Vec<FieldDefinition>,
    pub mode: HandlerMode,
    pub pattern: HandlerPattern,
    pub flags: HandlerFlags,
    /// Resolve independent async dependencies concurrently
    pub concurrent_dependencies: bool,
}

/// Compiled binding plus its injector
#[derive(Clone)]
pub struct HandlerMetadata {
    binding: Arc<HandlerBinding>,
    injector: Injector,
}

impl HandlerMetadata {
    pub fn new(binding: HandlerBinding, injector: Injector) -> Self {
        Self {
            binding: Arc::new(binding),
            injector,
        }
    }

    pub fn binding(&self) -> &HandlerBinding {
        &self.binding
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.binding.fields
    }

    pub fn mode(&self) -> HandlerMode {
        self.binding.mode
    }

    pub fn pattern(&self) -> HandlerPattern {
        self.binding.pattern
    }

    pub fn flags(&self) -> HandlerFlags {
        self.binding.flags
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }
}

impl std::fmt::Debug for HandlerMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerMetadata")
            .field("binding", &self.binding)
            .field("injector", &self.injector)
            .finish()
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compile a handler with the default configuration
pub fn compile_binder(handler: &Arc<Handler>, method: HttpMethod, route: &str) -> Result<HandlerMetadata, BinderError> {
    BinderCompiler::new(BinderConfig::default()).compile(handler, method, route)
}

/// Binder compiler carrying configuration and dependency bookkeeping
pub struct BinderCompiler {
    config: BinderConfig,
    /// Handlers currently being compiled, outermost first
    resolving: Vec<(HandlerId, String)>,
    /// Dependencies compiled for the current route
    compiled: HashMap<HandlerId, Arc<CompiledDependency>>,
}

impl BinderCompiler {
    pub fn new(config: BinderConfig) -> Self {
        Self {
            config,
            resolving: Vec::new(),
            compiled: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Compile a handler for one method and route pattern
    pub fn compile(
        &mut self,
        handler: &Arc<Handler>,
        method: HttpMethod,
        route: &str,
    ) -> Result<HandlerMetadata, BinderError> {
        let route = RoutePattern::parse(route)?;
        self.resolving.clear();
        self.compiled.clear();
        self.compile_handler(handler, method, &route)
    }

    fn compile_handler(
        &mut self,
        handler: &Arc<Handler>,
        method: HttpMethod,
        route: &RoutePattern,
    ) -> Result<HandlerMetadata, BinderError> {
        self.resolving.push((handler.id(), handler.name().to_string()));
        let result = self.bind_fields(handler, method, route);
        self.resolving.pop();
        let fields = result?;

        let summary = SourceSummary::from_fields(&fields);
        let pattern = classify_summary(&summary);
        let binding = HandlerBinding {
            handler_id: handler.id(),
            handler_name: handler.name().to_string(),
            method,
            route: route.clone(),
            mode: handler_mode(pattern),
            pattern,
            flags: HandlerFlags::new(&summary, route.is_static()),
            fields,
            concurrent_dependencies: self.config.concurrent_dependencies,
        };

        tracing::debug!(
            handler = %binding.handler_name,
            method = %method,
            route = %route,
            fields = binding.fields.len(),
            pattern = %pattern,
            "Compiled handler binder"
        );

        let injector = compile_argument_injector(&binding);
        Ok(HandlerMetadata::new(binding, injector))
    }

    fn bind_fields(
        &mut self,
        handler: &Arc<Handler>,
        method: HttpMethod,
        route: &RoutePattern,
    ) -> Result<Vec<FieldDefinition>, BinderError> {
        let name = handler.name();
        let params = handler.params();

        // First pass: sources, so body embedding can see every body field
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(params.len());
        for param in params {
            if !seen.insert(param.name.as_str()) {
                return Err(BinderError::DuplicateParameter {
                    handler: name.to_string(),
                    param: param.name.clone(),
                });
            }

            let source = infer_source(
                &param.name,
                &param.annotation,
                param.marker.as_ref(),
                route.param_names(),
                method,
                &self.config,
            )
            .map_err(|e| BinderError::BodyNotAllowed {
                handler: name.to_string(),
                param: param.name.clone(),
                location: e.location.to_string(),
                method: e.method,
            })?;

            let invalid = |reason: String| BinderError::InvalidParameter {
                handler: name.to_string(),
                param: param.name.clone(),
                reason,
            };
            // An aliased path parameter matches the route by alias or by name
            let path_key = match source {
                Source::Path => match [param.key(), param.name.as_str()].into_iter().find(|key| route.has_param(key)) {
                    Some(key) => Some(key),
                    None => {
                        return Err(invalid(format!(
                            "is a path parameter but route '{}' does not declare it",
                            route
                        )));
                    }
                },
                _ => None,
            };
            match source {
                Source::File if !param.annotation.is_upload() => {
                    return Err(invalid("reads from file but is not declared as an upload".to_string()));
                }
                Source::File | Source::Dependency | Source::Request => {}
                _ if param.annotation.is_upload() => {
                    return Err(invalid(format!("is declared as an upload but reads from {}", source)));
                }
                _ => {}
            }
            param
                .annotation
                .compile_patterns()
                .map_err(|e| invalid(format!("has an invalid pattern '{}': {}", e.pattern, e.reason)))?;

            sources.push((source, path_key));
        }

        let body_fields = sources.iter().filter(|(s, _)| *s == Source::Body).count();

        // Second pass: build each descriptor in one step
        let mut fields = Vec::with_capacity(params.len());
        for (param, (source, path_key)) in params.iter().zip(sources) {
            let builder = FieldDefinition::builder(param.name.as_str(), source, param.annotation.clone())
                .alias(param.alias.clone())
                .default(param.default.clone())
                .kind(param.kind);

            let builder = match (&param.marker, source) {
                (Some(Marker::Depends(depends)), Source::Dependency) => {
                    builder.dependency(self.compile_dependency(depends, method, route)?)
                }
                _ => {
                    let input = ExtractorInput {
                        source,
                        key: path_key.unwrap_or_else(|| param.key()),
                        annotation: &param.annotation,
                        default: param.default.as_ref(),
                        embed: body_fields > 1,
                    };
                    match build_extractor(input, &self.config) {
                        Some(extractor) => builder.extractor(extractor),
                        None => builder,
                    }
                }
            };

            fields.push(builder.build(name)?);
        }

        Ok(fields)
    }

    fn compile_dependency(
        &mut self,
        depends: &Depends,
        method: HttpMethod,
        route: &RoutePattern,
    ) -> Result<DependencySpec, BinderError> {
        let handler = self.config.overrides.resolve(&depends.handler);

        if let Some(start) = self.resolving.iter().position(|(id, _)| *id == handler.id()) {
            let mut cycle: Vec<String> = self.resolving[start..].iter().map(|(_, name)| name.clone()).collect();
            cycle.push(handler.name().to_string());
            return Err(BinderError::CircularDependency { cycle });
        }

        if let Some(compiled) = self.compiled.get(&handler.id()) {
            return Ok(DependencySpec::new(depends, Arc::clone(compiled)));
        }

        let metadata = self.compile_handler(&handler, method, route)?;
        let compiled = Arc::new(CompiledDependency::new(handler, metadata));
        self.compiled.insert(compiled.handler().id(), Arc::clone(&compiled));
        Ok(DependencySpec::new(depends, compiled))
    }
}
