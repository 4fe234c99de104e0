//! ouroboros-binder: registration-time argument binding compiler
//!
//! Turns a handler's declared parameters into a specialized procedure that
//! pulls exactly the values the handler needs out of an incoming request:
//! - Binder: analyzes the declaration once per route (sources, extractors, flags)
//! - Classifier: assigns one dispatch pattern per handler
//! - Injector: composes a per-pattern closure producing `(args, kwargs)`
//! - Dependencies: compiled recursively, cached per request, resolved concurrently
//!
//! # Example
//!
//! ```rust
//! use ouroboros_binder::{compile_binder, Annotation, Arg, Handler, HttpMethod, Param, Request, RequestParts, RequestScope, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handler = Handler::builder("get_item")
//!     .param(Param::new("id", Annotation::int()))
//!     .param(Param::new("q", Annotation::optional(Annotation::string())).default("all"))
//!     .build_async(|args| async move { Ok(Arg::Value(args.value("q").cloned().unwrap_or(Value::Null))) });
//!
//! let metadata = compile_binder(&handler, HttpMethod::Get, "/items/{id}").unwrap();
//!
//! let request = Request::new(
//!     RequestParts::new(HttpMethod::Get, "/items/5").with_path_param("id", Value::Int(5)),
//! );
//! let scope = RequestScope::new();
//! let args = metadata.injector().inject(&request, &scope).await.unwrap();
//! assert_eq!(args.value("q"), Some(&Value::from("all")));
//! # }
//! ```

pub mod binder;
pub mod config;
pub mod decoder;
pub mod dependency;
pub mod dispatch;
pub mod error;
pub mod extractors;
pub mod field;
pub mod handler;
pub mod http;
pub mod inference;
pub mod injector;
pub mod pattern;
pub mod request;
pub mod response;
pub mod scope;
pub mod types;
pub mod upload;
pub mod validators;
pub mod value;

// Re-exports
pub use binder::{compile_binder, BinderCompiler, HandlerBinding, HandlerMetadata};
pub use config::{BinderConfig, DependencyOverrides};
pub use decoder::{BodyDecoder, DecodeError, JsonDecoder};
pub use dependency::{CompiledDependency, DependencySpec};
pub use dispatch::{dispatch, dispatch_with, CompiledRoute, DispatchTable, RouteRegistry};
pub use error::{ApiError, ApiResult, BinderError, ErrorType, SourcePosition, ValidationError, ValidationErrors};
pub use extractors::Extractor;
pub use field::{FieldDefinition, FieldDefinitionBuilder, PassKind, Source};
pub use handler::{BoxFuture, Depends, ExecutionMode, Handler, HandlerBuilder, HandlerId, Marker, Param, ParamKind};
pub use http::{HttpMethod, RoutePattern};
pub use inference::infer_source;
pub use injector::{compile_argument_injector, compile_full_injector, Injector};
pub use pattern::{classify, HandlerFlags, HandlerMode, HandlerPattern, SourceSummary};
pub use request::{FilePart, FormView, Request, RequestParts};
pub use response::{DispatchResponse, JsonSerializer, ResponseDescriptor, ResponseSerializer};
pub use scope::RequestScope;
pub use types::{
    Annotation, InvalidPattern, ModelField, ModelSchema, NumericConstraints, StringConstraints, StringFormat, StringPattern,
};
pub use upload::{HeldUploads, UploadConfig, UploadFile};
pub use value::{Arg, CallArgs, Value};
