//! Dependency resolution
//!
//! A dependency is any [`Handler`] named by a `Depends` marker. It is compiled
//! with the same binder as a route handler, so its own parameters are bound
//! from the same request. At request time resolution is:
//!
//! 1. look up the request's cache slot (when caching is enabled)
//! 2. otherwise run the dependency's injector and call it
//! 3. store the value in the slot
//!
//! Errors from the dependency's own fields surface unchanged.

use std::fmt;
use std::sync::Arc;

use crate::binder::HandlerMetadata;
use crate::error::ApiResult;
use crate::handler::{BoxFuture, Depends, ExecutionMode, Handler, HandlerId};
use crate::request::Request;
use crate::scope::RequestScope;
use crate::value::Arg;

/// A dependency callable together with its compiled binder
pub struct CompiledDependency {
    handler: Arc<Handler>,
    metadata: HandlerMetadata,
}

impl CompiledDependency {
    pub fn new(handler: Arc<Handler>, metadata: HandlerMetadata) -> Self {
        Self { handler, metadata }
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    pub fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }
}

impl fmt::Debug for CompiledDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledDependency")
            .field("handler", &self.handler.name())
            .field("pattern", &self.metadata.pattern())
            .finish()
    }
}

/// Compiled dependency marker attached to a field
#[derive(Clone)]
pub struct DependencySpec {
    use_cache: bool,
    compiled: Arc<CompiledDependency>,
}

impl DependencySpec {
    pub fn new(depends: &Depends, compiled: Arc<CompiledDependency>) -> Self {
        Self {
            use_cache: depends.use_cache,
            compiled,
        }
    }

    /// Identity of the callable that actually runs (after overrides)
    pub fn id(&self) -> HandlerId {
        self.compiled.handler.id()
    }

    pub fn name(&self) -> &str {
        self.compiled.handler.name()
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn is_async(&self) -> bool {
        self.compiled.handler.mode() == ExecutionMode::Async
    }

    pub fn compiled(&self) -> &Arc<CompiledDependency> {
        &self.compiled
    }

    /// Resolve the dependency for one request
    pub fn resolve<'a>(&'a self, request: &'a Request, scope: &'a RequestScope) -> BoxFuture<'a, ApiResult<Arg>> {
        Box::pin(async move {
            if !self.use_cache {
                return self.run(request, scope).await;
            }

            let slot = scope.dependency_slot(self.id());
            let value = slot.get_or_try_init(|| self.run(request, scope)).await?;
            Ok(value.clone())
        })
    }

    async fn run(&self, request: &Request, scope: &RequestScope) -> ApiResult<Arg> {
        let args = self.compiled.metadata.injector().inject(request, scope).await?;
        tracing::trace!(dependency = %self.name(), "Resolving dependency");
        self.compiled.handler.call(args).await
    }
}

impl PartialEq for DependencySpec {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.use_cache == other.use_cache
    }
}

impl fmt::Debug for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencySpec")
            .field("handler", &self.name())
            .field("use_cache", &self.use_cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::compile_binder;
    use crate::handler::Param;
    use crate::http::HttpMethod;
    use crate::request::RequestParts;
    use crate::types::Annotation;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_dependency(calls: Arc<AtomicUsize>) -> Arc<Handler> {
        Handler::builder("counter").build_async(move |_| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) as i64;
                Ok(Arg::Value(Value::Int(n)))
            }
        })
    }

    fn dependency_spec(handler: &Arc<Handler>, depends: Depends) -> DependencySpec {
        let consumer = Handler::builder("consumer")
            .param(Param::dependency("value", depends))
            .build_async(|_| async { Ok(Arg::Value(Value::Null)) });
        let metadata = compile_binder(&consumer, HttpMethod::Get, "/").unwrap();
        let spec = metadata.fields()[0].dependency().unwrap().clone();
        assert_eq!(spec.id(), handler.id());
        spec
    }

    #[tokio::test]
    async fn test_cached_resolution_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting_dependency(calls.clone());
        let spec = dependency_spec(&handler, Depends::new(&handler));

        let request = Request::new(RequestParts::new(HttpMethod::Get, "/"));
        let scope = RequestScope::new();
        assert_eq!(spec.resolve(&request, &scope).await.unwrap(), Arg::Value(Value::Int(0)));
        assert_eq!(spec.resolve(&request, &scope).await.unwrap(), Arg::Value(Value::Int(0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // cache is per request
        let scope = RequestScope::new();
        assert_eq!(spec.resolve(&request, &scope).await.unwrap(), Arg::Value(Value::Int(1)));
    }

    #[tokio::test]
    async fn test_no_cache_runs_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting_dependency(calls.clone());
        let spec = dependency_spec(&handler, Depends::new(&handler).no_cache());

        let request = Request::new(RequestParts::new(HttpMethod::Get, "/"));
        let scope = RequestScope::new();
        spec.resolve(&request, &scope).await.unwrap();
        spec.resolve(&request, &scope).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(scope.cached_dependency(spec.id()).is_none());
    }

    #[tokio::test]
    async fn test_dependency_field_errors_propagate() {
        let token = Handler::builder("token")
            .param(Param::new("x_token", Annotation::string()).header())
            .build_async(|args| async move { Ok(args.get("x_token").cloned().unwrap_or(Arg::Value(Value::Null))) });
        let spec = dependency_spec(&token, Depends::new(&token));

        let request = Request::new(RequestParts::new(HttpMethod::Get, "/"));
        let scope = RequestScope::new();
        let error = spec.resolve(&request, &scope).await.unwrap_err();
        let errors = error.validation_errors().unwrap();
        assert_eq!(errors.errors[0].location, "header");
        assert_eq!(errors.errors[0].field, "x-token");

        let request = Request::new(RequestParts::new(HttpMethod::Get, "/").with_header("X-Token", "abc"));
        let scope = RequestScope::new();
        assert_eq!(spec.resolve(&request, &scope).await.unwrap(), Arg::Value(Value::from("abc")));
    }
}
