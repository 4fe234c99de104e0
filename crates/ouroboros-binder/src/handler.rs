//! Handler declarations
//!
//! Handlers are declared up front: an ordered parameter list plus the
//! callable itself. The binder reads the declaration once at registration;
//! nothing here is inspected per request.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::types::Annotation;
use crate::upload::HeldUploads;
use crate::value::{Arg, CallArgs, Value};

/// Boxed future type for async handlers and dependency resolution
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type AsyncFn = Arc<dyn Fn(CallArgs) -> BoxFuture<'static, ApiResult<Arg>> + Send + Sync>;
type BlockingFn = Arc<dyn Fn(CallArgs) -> ApiResult<Arg> + Send + Sync>;

// ============================================================================
// Identity
// ============================================================================

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique numeric handler id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the handler's callable must be driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Cooperative; awaited on the request task
    Async,
    /// Blocking; run on the blocking pool
    Blocking,
}

// ============================================================================
// Parameters
// ============================================================================

/// Passing discipline declared for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamKind {
    PositionalOnly,
    #[default]
    PositionalOrKeyword,
    KeywordOnly,
}

/// Marks a parameter as produced by another handler-like callable
#[derive(Clone)]
pub struct Depends {
    pub handler: Arc<Handler>,
    /// Reuse the value within one request (default true)
    pub use_cache: bool,
}

impl Depends {
    pub fn new(handler: &Arc<Handler>) -> Self {
        Self {
            handler: Arc::clone(handler),
            use_cache: true,
        }
    }

    /// Resolve on every use instead of once per request
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

impl PartialEq for Depends {
    fn eq(&self, other: &Self) -> bool {
        self.handler.id() == other.handler.id() && self.use_cache == other.use_cache
    }
}

impl fmt::Debug for Depends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Depends")
            .field("handler", &self.handler.name())
            .field("use_cache", &self.use_cache)
            .finish()
    }
}

/// Explicit source marker written by the handler author
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    Form,
    File,
    Depends(Depends),
}

/// One declared handler parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Annotation,
    pub default: Option<Value>,
    pub alias: Option<String>,
    pub marker: Option<Marker>,
    pub kind: ParamKind,
}

impl Param {
    pub fn new(name: impl Into<String>, annotation: Annotation) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: None,
            alias: None,
            marker: None,
            kind: ParamKind::default(),
        }
    }

    /// Parameter bound to another callable's result
    pub fn dependency(name: impl Into<String>, depends: Depends) -> Self {
        Self::new(name, Annotation::Any).marker(Marker::Depends(depends))
    }

    /// External key: the alias if set, otherwise the name
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn path(self) -> Self {
        self.marker(Marker::Path)
    }

    pub fn query(self) -> Self {
        self.marker(Marker::Query)
    }

    pub fn header(self) -> Self {
        self.marker(Marker::Header)
    }

    pub fn cookie(self) -> Self {
        self.marker(Marker::Cookie)
    }

    pub fn body(self) -> Self {
        self.marker(Marker::Body)
    }

    pub fn form(self) -> Self {
        self.marker(Marker::Form)
    }

    pub fn file(self) -> Self {
        self.marker(Marker::File)
    }

    pub fn kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn positional_only(self) -> Self {
        self.kind(ParamKind::PositionalOnly)
    }

    pub fn keyword_only(self) -> Self {
        self.kind(ParamKind::KeywordOnly)
    }
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Clone)]
enum HandlerFn {
    Async(AsyncFn),
    Blocking(BlockingFn),
}

/// A declared handler (or dependency) and its callable
pub struct Handler {
    id: HandlerId,
    name: String,
    params: Vec<Param>,
    func: HandlerFn,
}

impl Handler {
    pub fn builder(name: impl Into<String>) -> HandlerBuilder {
        HandlerBuilder {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn mode(&self) -> ExecutionMode {
        match self.func {
            HandlerFn::Async(_) => ExecutionMode::Async,
            HandlerFn::Blocking(_) => ExecutionMode::Blocking,
        }
    }

    /// Invoke the callable with bound arguments.
    ///
    /// Blocking callables run on tokio's blocking pool so they never stall
    /// the request task's scheduler.
    pub async fn call(&self, args: CallArgs) -> ApiResult<Arg> {
        self.call_holding(args, HeldUploads::default()).await
    }

    /// Invoke the callable, keeping `uploads` readable until it returns.
    ///
    /// A blocking callable owns the handles on its pool thread, so dropping
    /// the awaiting task does not release files the callable is still using.
    pub async fn call_holding(&self, args: CallArgs, uploads: HeldUploads) -> ApiResult<Arg> {
        match &self.func {
            HandlerFn::Async(f) => {
                let result = f(args).await;
                drop(uploads);
                result
            }
            HandlerFn::Blocking(f) => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || {
                    let result = f(args);
                    drop(uploads);
                    result
                })
                .await
                .map_err(|e| ApiError::Internal(format!("Blocking handler '{}' failed: {}", self.name, e)))?
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("mode", &self.mode())
            .finish()
    }
}

/// Builder for [`Handler`]
#[derive(Debug, Clone)]
pub struct HandlerBuilder {
    name: String,
    params: Vec<Param>,
}

impl HandlerBuilder {
    /// Append a parameter (declaration order is preserved)
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Finish with an async callable
    pub fn build_async<F, Fut>(self, f: F) -> Arc<Handler>
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Arg>> + Send + 'static,
    {
        let func: AsyncFn = Arc::new(move |args| -> BoxFuture<'static, ApiResult<Arg>> { Box::pin(f(args)) });
        self.finish(HandlerFn::Async(func))
    }

    /// Finish with a blocking callable
    pub fn build_blocking<F>(self, f: F) -> Arc<Handler>
    where
        F: Fn(CallArgs) -> ApiResult<Arg> + Send + Sync + 'static,
    {
        self.finish(HandlerFn::Blocking(Arc::new(f)))
    }

    fn finish(self, func: HandlerFn) -> Arc<Handler> {
        Arc::new(Handler {
            id: HandlerId::next(),
            name: self.name,
            params: self.params,
            func,
        })
    }
}
