//! Dispatch and route registry
//!
//! [`dispatch`] runs one request end to end: bind, invoke, serialize. Upload
//! handles produced while binding are released on every exit path. Once the
//! handler is invoked they belong to the call, so a blocking handler keeps
//! its files even if the request task is dropped while it runs.
//!
//! [`RouteRegistry`] compiles routes at startup, keyed by handler id.
//! Freezing it yields a read-only [`DispatchTable`] for the serving runtime.

use std::collections::HashMap;
use std::sync::Arc;

use crate::binder::{BinderCompiler, HandlerMetadata};
use crate::config::BinderConfig;
use crate::error::{ApiError, ApiResult, BinderError};
use crate::handler::{Handler, HandlerId};
use crate::http::HttpMethod;
use crate::request::Request;
use crate::response::{DispatchResponse, JsonSerializer, ResponseSerializer};
use crate::scope::RequestScope;
use crate::value::Arg;

// ============================================================================
// Dispatch
// ============================================================================

/// Bind, invoke and serialize with the default JSON serializer
pub async fn dispatch(handler: &Handler, request: &Request, metadata: &HandlerMetadata) -> DispatchResponse {
    dispatch_with(handler, request, metadata, &JsonSerializer).await
}

/// Bind, invoke and serialize with a custom serializer
pub async fn dispatch_with(
    handler: &Handler,
    request: &Request,
    metadata: &HandlerMetadata,
    serializer: &dyn ResponseSerializer,
) -> DispatchResponse {
    let scope = RequestScope::new();
    let result = invoke(handler, request, metadata, &scope).await;
    scope.release_uploads();

    match result.and_then(|arg| serializer.serialize(&arg)) {
        Ok(response) => response,
        Err(error) => serializer.serialize_error(&error),
    }
}

async fn invoke(
    handler: &Handler,
    request: &Request,
    metadata: &HandlerMetadata,
    scope: &RequestScope,
) -> ApiResult<Arg> {
    let args = match metadata.injector().inject(request, scope).await {
        Ok(args) => args,
        Err(ApiError::Validation(errors)) => {
            tracing::debug!(
                handler = %handler.name(),
                path = %request.path(),
                errors = errors.len(),
                "Request binding failed"
            );
            return Err(ApiError::Validation(errors));
        }
        Err(e) => return Err(e),
    };

    // Upload handles travel with the call and are released when it returns
    handler.call_holding(args, scope.take_uploads()).await.map_err(|e| {
        if !e.is_binding_error() {
            tracing::error!(handler = %handler.name(), path = %request.path(), error = %e, "Handler failed");
        }
        e
    })
}

// ============================================================================
// Registry
// ============================================================================

/// A handler compiled for one method and route pattern
#[derive(Clone)]
pub struct CompiledRoute {
    handler: Arc<Handler>,
    metadata: HandlerMetadata,
}

impl CompiledRoute {
    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    pub fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }

    pub fn method(&self) -> HttpMethod {
        self.metadata.binding().method
    }

    pub fn pattern(&self) -> &str {
        self.metadata.binding().route.as_str()
    }
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("handler", &self.handler.name())
            .field("method", &self.method())
            .field("pattern", &self.pattern())
            .field("binder", &self.metadata.pattern())
            .finish()
    }
}

/// Registration-time route table
pub struct RouteRegistry {
    compiler: BinderCompiler,
    routes: HashMap<HandlerId, CompiledRoute>,
    serializer: Arc<dyn ResponseSerializer>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::with_config(BinderConfig::default())
    }

    pub fn with_config(config: BinderConfig) -> Self {
        Self {
            compiler: BinderCompiler::new(config),
            routes: HashMap::new(),
            serializer: Arc::new(JsonSerializer),
        }
    }

    /// Replace the response serializer (builder pattern)
    pub fn serializer(mut self, serializer: Arc<dyn ResponseSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Compile and store a route. Each handler may be registered once.
    pub fn register(
        &mut self,
        method: HttpMethod,
        pattern: &str,
        handler: &Arc<Handler>,
    ) -> Result<HandlerId, BinderError> {
        let id = handler.id();
        if self.routes.contains_key(&id) {
            return Err(BinderError::DuplicateRoute(id));
        }

        let metadata = self.compiler.compile(handler, method, pattern)?;
        tracing::info!(
            handler = %handler.name(),
            id = %id,
            method = %method,
            pattern = %pattern,
            binder = %metadata.pattern(),
            "Registered route"
        );

        self.routes.insert(
            id,
            CompiledRoute {
                handler: Arc::clone(handler),
                metadata,
            },
        );
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freeze into the read-only table used at request time
    pub fn into_table(self) -> DispatchTable {
        DispatchTable {
            routes: self.routes,
            serializer: self.serializer,
        }
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only map from handler id to compiled route
#[derive(Clone)]
pub struct DispatchTable {
    routes: HashMap<HandlerId, CompiledRoute>,
    serializer: Arc<dyn ResponseSerializer>,
}

impl DispatchTable {
    pub fn get(&self, id: HandlerId) -> Option<&CompiledRoute> {
        self.routes.get(&id)
    }

    /// Dispatch a request to a registered handler; None if the id is unknown
    pub async fn dispatch(&self, id: HandlerId, request: &Request) -> Option<DispatchResponse> {
        let route = self.routes.get(&id)?;
        Some(dispatch_with(&route.handler, request, &route.metadata, self.serializer.as_ref()).await)
    }

    pub fn ids(&self) -> impl Iterator<Item = HandlerId> + '_ {
        self.routes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable").field("routes", &self.routes.len()).finish()
    }
}
