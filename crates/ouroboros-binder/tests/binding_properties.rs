//! Behavioral properties of the binding compiler, exercised end to end
//! through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use ouroboros_binder::pattern::classify_summary;
use ouroboros_binder::{
    compile_binder, compile_full_injector, dispatch, ApiError, Annotation, Arg, BinderCompiler, BinderConfig,
    BinderError, BodyDecoder, DecodeError, Depends, FilePart, Handler, HandlerPattern, HttpMethod, JsonDecoder,
    ModelField, ModelSchema, Param, Request, RequestParts, RequestScope, SourceSummary, StringConstraints, UploadFile,
    Value,
};

// ============================================================================
// Helpers
// ============================================================================

fn noop(name: &str, params: Vec<Param>) -> Arc<Handler> {
    params
        .into_iter()
        .fold(Handler::builder(name), |builder, param| builder.param(param))
        .build_async(|_| async { Ok(Arg::Value(Value::Null)) })
}

fn item() -> Annotation {
    Annotation::model(
        ModelSchema::new("Item")
            .field(ModelField::new("name", Annotation::string()))
            .field(ModelField::new("price", Annotation::float())),
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

struct CountingDecoder {
    calls: AtomicUsize,
}

impl BodyDecoder for CountingDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Value, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        JsonDecoder.decode(payload)
    }
}

// ============================================================================
// Pattern determinism
// ============================================================================

/// Reference decision table, written independently of the classifier
fn expected_pattern(flags: [bool; 9]) -> HandlerPattern {
    let [path, query, header, cookie, body, form, file, dependency, request] = flags;
    let others = path || query || header || cookie || body || form || file;

    if dependency {
        HandlerPattern::WithDeps
    } else if !others && !request {
        HandlerPattern::NoParams
    } else if request && !others {
        HandlerPattern::RequestOnly
    } else if request || form || file || header || cookie {
        HandlerPattern::Full
    } else if body {
        if path || query {
            HandlerPattern::Full
        } else {
            HandlerPattern::BodyOnly
        }
    } else if path && query {
        HandlerPattern::Simple
    } else if path {
        HandlerPattern::PathOnly
    } else {
        HandlerPattern::QueryOnly
    }
}

#[test]
fn test_classifier_matches_decision_table() {
    for bits in 0u32..(1 << 9) {
        let flags: [bool; 9] = std::array::from_fn(|i| bits & (1 << i) != 0);
        let count = |i: usize| usize::from(flags[i]);
        let summary = SourceSummary {
            path: count(0),
            query: count(1),
            header: count(2),
            cookie: count(3),
            body: count(4),
            form: count(5),
            file: count(6),
            dependency: count(7),
            request: count(8),
        };

        let first = classify_summary(&summary);
        assert_eq!(first, classify_summary(&summary), "classifier not deterministic for {:?}", flags);
        assert_eq!(first, expected_pattern(flags), "unexpected pattern for {:?}", flags);
    }
}

// ============================================================================
// Specialized injectors agree with the full injector
// ============================================================================

fn templates() -> Vec<Param> {
    let token = noop("token", vec![Param::new("x_token", Annotation::string()).header()]);
    let db = noop("db", vec![]);
    vec![
        Param::new("id", Annotation::int()),
        Param::new("q", Annotation::optional(Annotation::string())).default("all"),
        Param::new("limit", Annotation::int()).positional_only(),
        Param::new("x_token", Annotation::string()).header(),
        Param::new("session", Annotation::optional(Annotation::string())).cookie(),
        Param::new("item", item()),
        Param::new("request", Annotation::Any),
        Param::dependency("auth", Depends::new(&token)),
        Param::dependency("db", Depends::new(&db)),
    ]
}

fn full_request() -> Request {
    Request::new(
        RequestParts::new(HttpMethod::Post, "/items/5")
            .with_path_param("id", Value::Int(5))
            .with_query_param("q", "needle")
            .with_query_param("limit", Value::Int(10))
            .with_header("X-Token", "secret")
            .with_cookie("session", "abc")
            .with_json(&serde_json::json!({"name": "x", "price": 1.5})),
    )
}

fn empty_request() -> Request {
    Request::new(RequestParts::new(HttpMethod::Post, "/items/5"))
}

#[tokio::test]
async fn test_specialized_injectors_match_full() {
    let templates = templates();
    let mut patterns_seen = Vec::new();

    for mask in 0u32..(1 << templates.len()) {
        let params: Vec<Param> = templates
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, p)| p.clone())
            .collect();
        let route = if params.iter().any(|p| p.name == "id") { "/items/{id}" } else { "/items" };
        let handler = noop("h", params);

        let metadata = compile_binder(&handler, HttpMethod::Post, route).unwrap();
        let full = compile_full_injector(metadata.binding());
        if !patterns_seen.contains(&metadata.pattern()) {
            patterns_seen.push(metadata.pattern());
        }

        for request in [full_request(), empty_request()] {
            let specialized = metadata.injector().inject(&request, &RequestScope::new()).await;
            let generic = full.inject(&request, &RequestScope::new()).await;
            match (specialized, generic) {
                (Ok(a), Ok(b)) => assert_eq!(a, b, "mask {:#b}", mask),
                (Err(a), Err(b)) => assert_eq!(a.validation_errors(), b.validation_errors(), "mask {:#b}", mask),
                (a, b) => panic!("mask {:#b}: injectors disagree: {:?} vs {:?}", mask, a, b),
            }
        }
    }

    for pattern in [
        HandlerPattern::NoParams,
        HandlerPattern::RequestOnly,
        HandlerPattern::PathOnly,
        HandlerPattern::QueryOnly,
        HandlerPattern::BodyOnly,
        HandlerPattern::Simple,
        HandlerPattern::WithDeps,
        HandlerPattern::Full,
    ] {
        assert!(patterns_seen.contains(&pattern), "{} not covered", pattern);
    }
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_compile_twice_is_identical() {
    let db = noop("db", vec![]);
    let handler = noop(
        "h",
        vec![
            Param::new("id", Annotation::int()),
            Param::new("x_token", Annotation::string()).header(),
            Param::dependency("db", Depends::new(&db)),
        ],
    );

    let first = compile_binder(&handler, HttpMethod::Get, "/items/{id}").unwrap();
    let second = compile_binder(&handler, HttpMethod::Get, "/items/{id}").unwrap();
    assert_eq!(first.pattern(), second.pattern());
    assert_eq!(first.flags(), second.flags());
    assert_eq!(first.fields(), second.fields());
}

// ============================================================================
// Missing and optional values
// ============================================================================

#[tokio::test]
async fn test_missing_required_query_names_key() {
    let handler = noop(
        "read_item",
        vec![Param::new("id", Annotation::int()), Param::new("q", Annotation::string())],
    );
    let metadata = compile_binder(&handler, HttpMethod::Get, "/items/{id}").unwrap();
    let request = Request::new(RequestParts::new(HttpMethod::Get, "/items/5").with_path_param("id", Value::Int(5)));

    let error = metadata.injector().inject(&request, &RequestScope::new()).await.unwrap_err();
    let errors = error.validation_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors[0].location, "query");
    assert_eq!(errors.errors[0].field, "q");
}

#[tokio::test]
async fn test_missing_header_and_cookie_name_keys() {
    let handler = noop(
        "h",
        vec![
            Param::new("x_token", Annotation::string()).header(),
            Param::new("session", Annotation::string()).cookie(),
        ],
    );
    let metadata = compile_binder(&handler, HttpMethod::Get, "/").unwrap();
    let request = Request::new(RequestParts::new(HttpMethod::Get, "/"));

    let error = metadata.injector().inject(&request, &RequestScope::new()).await.unwrap_err();
    let keys: Vec<_> = error
        .validation_errors()
        .unwrap()
        .errors
        .iter()
        .map(|e| (e.location.clone(), e.field.clone()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("header".to_string(), "x-token".to_string()),
            ("cookie".to_string(), "session".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_optional_query_uses_default() {
    let handler = noop(
        "read_item",
        vec![
            Param::new("id", Annotation::int()),
            Param::new("q", Annotation::optional(Annotation::string())).default("all"),
        ],
    );
    let metadata = compile_binder(&handler, HttpMethod::Get, "/items/{id}").unwrap();
    let request = Request::new(RequestParts::new(HttpMethod::Get, "/items/5").with_path_param("id", Value::Int(5)));

    let args = metadata.injector().inject(&request, &RequestScope::new()).await.unwrap();
    assert_eq!(args.value("q"), Some(&Value::from("all")));
    assert_eq!(args.value("id"), Some(&Value::Int(5)));
}

#[tokio::test]
async fn test_pattern_constraint_checked_per_value() {
    let slug = Annotation::String(StringConstraints {
        pattern: Some("^[a-z-]+$".into()),
        ..Default::default()
    });
    let handler = noop("tag", vec![Param::new("slug", slug)]);
    let metadata = compile_binder(&handler, HttpMethod::Get, "/tags").unwrap();

    let ok = Request::new(RequestParts::new(HttpMethod::Get, "/tags").with_query_param("slug", "rust-lang"));
    assert!(metadata.injector().inject(&ok, &RequestScope::new()).await.is_ok());

    let bad = Request::new(RequestParts::new(HttpMethod::Get, "/tags").with_query_param("slug", "Rust Lang"));
    let error = metadata.injector().inject(&bad, &RequestScope::new()).await.unwrap_err();
    let errors = error.validation_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors[0].field, "slug");
    assert!(errors.errors[0].message.contains("does not match pattern"));
}

// ============================================================================
// Body decoded once
// ============================================================================

#[tokio::test]
async fn test_body_decoded_once_per_request() {
    let decoder = Arc::new(CountingDecoder {
        calls: AtomicUsize::new(0),
    });
    let handler = noop(
        "create_item",
        vec![
            Param::new("name", Annotation::string()).body(),
            Param::new("price", Annotation::float()).body(),
        ],
    );
    let config = BinderConfig::new().decoder(decoder.clone());
    let metadata = BinderCompiler::new(config)
        .compile(&handler, HttpMethod::Post, "/items")
        .unwrap();
    assert_eq!(metadata.pattern(), HandlerPattern::Full);

    let request = Request::new(
        RequestParts::new(HttpMethod::Post, "/items").with_json(&serde_json::json!({"name": "x", "price": 1.5})),
    );
    let args = metadata.injector().inject(&request, &RequestScope::new()).await.unwrap();

    assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(args.value("name"), Some(&Value::from("x")));
    assert_eq!(args.value("price"), Some(&Value::Float(1.5)));

    // a fresh request decodes again
    metadata.injector().inject(&request, &RequestScope::new()).await.unwrap();
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_malformed_body_reports_position() {
    let handler = noop("create_item", vec![Param::new("item", item())]);
    let metadata = compile_binder(&handler, HttpMethod::Post, "/items").unwrap();
    let request = Request::new(
        RequestParts::new(HttpMethod::Post, "/items")
            .with_header("content-type", "application/json")
            .with_body("{\"name\": \"x\",\n \"price\": }"),
    );

    let error = metadata.injector().inject(&request, &RequestScope::new()).await.unwrap_err();
    let errors = error.validation_errors().unwrap();
    let position = errors.errors[0].position.unwrap();
    assert_eq!(errors.errors[0].location, "body");
    assert_eq!(position.line, 2);
}

// ============================================================================
// Dependency cache
// ============================================================================

fn counted(calls: &Arc<AtomicUsize>) -> Arc<Handler> {
    let calls = Arc::clone(calls);
    Handler::builder("get_db").build_async(move |_| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arg::object("connection".to_string()))
        }
    })
}

#[tokio::test]
async fn test_shared_dependency_runs_once_per_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let db = counted(&calls);
    let handler = noop(
        "h",
        vec![
            Param::dependency("reader", Depends::new(&db)),
            Param::dependency("writer", Depends::new(&db)),
        ],
    );
    let metadata = compile_binder(&handler, HttpMethod::Get, "/").unwrap();
    assert_eq!(metadata.pattern(), HandlerPattern::WithDeps);

    let request = Request::new(RequestParts::new(HttpMethod::Get, "/"));
    let args = metadata.injector().inject(&request, &RequestScope::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(args.get("reader").and_then(|a| a.downcast_ref::<String>()).map(String::as_str), Some("connection"));

    metadata.injector().inject(&request, &RequestScope::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_uncached_dependency_runs_per_use() {
    let calls = Arc::new(AtomicUsize::new(0));
    let db = counted(&calls);
    let handler = noop(
        "h",
        vec![
            Param::dependency("reader", Depends::new(&db).no_cache()),
            Param::dependency("writer", Depends::new(&db).no_cache()),
        ],
    );
    let metadata = BinderCompiler::new(BinderConfig::new().concurrent_dependencies(false))
        .compile(&handler, HttpMethod::Get, "/")
        .unwrap();

    let request = Request::new(RequestParts::new(HttpMethod::Get, "/"));
    metadata.injector().inject(&request, &RequestScope::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Upload cleanup
// ============================================================================

fn upload_handler(seen: Arc<Mutex<Vec<UploadFile>>>, fail: bool) -> Arc<Handler> {
    Handler::builder("upload")
        .param(Param::new("doc", Annotation::Upload))
        .build_async(move |args| {
            let seen = Arc::clone(&seen);
            async move {
                if let Some(upload) = args.get("doc").and_then(Arg::as_upload) {
                    assert!(!upload.is_released());
                    seen.lock().push(upload.clone());
                }
                if fail {
                    return Err(ApiError::Handler("storage unavailable".to_string()));
                }
                Ok(Arg::Value(Value::from("stored")))
            }
        })
}

fn upload_request() -> Request {
    Request::new(RequestParts::new(HttpMethod::Post, "/upload").with_file(
        "doc",
        FilePart::new(
            Some("report.txt".to_string()),
            Some("text/plain".to_string()),
            Bytes::from_static(b"hello"),
        ),
    ))
}

#[tokio::test]
async fn test_upload_released_after_success() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = upload_handler(Arc::clone(&seen), false);
    let metadata = compile_binder(&handler, HttpMethod::Post, "/upload").unwrap();
    assert!(metadata.flags().has_file_uploads);

    let response = dispatch(&handler, &upload_request(), &metadata).await;
    assert_eq!(response.status_code, 200);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_released());
    // already released exactly once
    assert!(!seen[0].release());
}

#[tokio::test]
async fn test_upload_released_after_handler_fault() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = upload_handler(Arc::clone(&seen), true);
    let metadata = compile_binder(&handler, HttpMethod::Post, "/upload").unwrap();

    let response = dispatch(&handler, &upload_request(), &metadata).await;
    assert_eq!(response.status_code, 500);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_released());
    assert!(!seen[0].release());
}

#[tokio::test]
async fn test_missing_upload_is_binding_error() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = upload_handler(Arc::clone(&seen), false);
    let metadata = compile_binder(&handler, HttpMethod::Post, "/upload").unwrap();

    let request = Request::new(RequestParts::new(HttpMethod::Post, "/upload"));
    let response = dispatch(&handler, &request, &metadata).await;
    assert_eq!(response.status_code, 422);
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_dropped_request_leaves_blocking_handler_its_upload() {
    init_tracing();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let handler = Handler::builder("slow_upload")
        .param(Param::new("doc", Annotation::Upload))
        .build_blocking(move |args| {
            std::thread::sleep(Duration::from_millis(50));
            let data = args.get("doc").and_then(Arg::as_upload).and_then(UploadFile::read);
            let _ = tx.lock().send(data);
            Ok(Arg::Value(Value::Null))
        });
    let metadata = compile_binder(&handler, HttpMethod::Post, "/upload").unwrap();

    let request = upload_request();
    let outcome = tokio::time::timeout(Duration::from_millis(5), dispatch(&handler, &request, &metadata)).await;
    assert!(outcome.is_err(), "dispatch should still be running");

    let data = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data, Some(Bytes::from_static(b"hello")));
}

// ============================================================================
// Registration-time invariants
// ============================================================================

#[test]
fn test_body_param_on_get_fails_registration() {
    let handler = noop("search", vec![Param::new("item", item()).body()]);
    let error = compile_binder(&handler, HttpMethod::Get, "/search").unwrap_err();
    match error {
        BinderError::BodyNotAllowed { param, method, .. } => {
            assert_eq!(param, "item");
            assert_eq!(method, HttpMethod::Get);
        }
        other => panic!("unexpected error: {other}"),
    }

    // the same declaration is legal where a body is allowed
    assert!(compile_binder(&handler, HttpMethod::Post, "/search").is_ok());
}

#[test]
fn test_override_cycle_fails_registration() {
    let placeholder = noop("get_settings", vec![]);
    let user = noop("get_user", vec![Param::dependency("settings", Depends::new(&placeholder))]);
    let settings = noop("get_settings", vec![Param::dependency("user", Depends::new(&user))]);
    let handler = noop("me", vec![Param::dependency("user", Depends::new(&user))]);

    let config = BinderConfig::new().override_dependency(&placeholder, &settings);
    let error = BinderCompiler::new(config)
        .compile(&handler, HttpMethod::Get, "/me")
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Circular dependency detected: get_user -> get_settings -> get_user"
    );
}
