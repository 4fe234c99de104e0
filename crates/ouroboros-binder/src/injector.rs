//! Injector compiler
//!
//! Turns a compiled [`HandlerBinding`] into the procedure that maps a request
//! to call arguments. Each pattern gets a closure holding exactly the
//! extraction steps it needs:
//!
//! | Pattern | Injector |
//! |---------|----------|
//! | `NO_PARAMS` | constant empty arguments |
//! | `REQUEST_ONLY` | the request itself |
//! | `PATH_ONLY` / `QUERY_ONLY` | entry list over one sub-view |
//! | `BODY_ONLY` | one body extractor, positional or keyword |
//! | `SIMPLE` | entry list tagged with its sub-view |
//! | `WITH_DEPS` | extraction plan, independent async dependencies concurrent |
//! | `FULL` | extraction plan, strictly sequential |
//!
//! Validation errors from extractors accumulate across fields so one response
//! reports every missing or invalid value. A failing dependency stops the
//! plan at its declared position, keeping errors from fields before it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;

use crate::binder::HandlerBinding;
use crate::dependency::DependencySpec;
use crate::error::{ApiError, ApiResult, ValidationErrors};
use crate::extractors::{BodyFn, Extractor, ParamFn};
use crate::field::{FieldDefinition, PassKind, Source};
use crate::pattern::HandlerPattern;
use crate::request::{ParamMap, Request};
use crate::scope::RequestScope;
use crate::value::{Arg, CallArgs};

/// Injector that never suspends
pub type SyncInjectFn = Arc<dyn Fn(&Request, &RequestScope) -> ApiResult<CallArgs> + Send + Sync>;

/// Compiled per-handler argument injector
#[derive(Clone)]
pub enum Injector {
    /// Straight-line extraction, no dependencies
    Sync(SyncInjectFn),
    /// Step plan that may await dependencies
    Plan(Arc<ExtractionPlan>),
}

impl Injector {
    /// Bind call arguments for one request
    pub async fn inject(&self, request: &Request, scope: &RequestScope) -> ApiResult<CallArgs> {
        match self {
            Self::Sync(f) => f(request, scope),
            Self::Plan(plan) => plan.execute(request, scope).await,
        }
    }

    pub fn is_plan(&self) -> bool {
        matches!(self, Self::Plan(_))
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Injector::Sync"),
            Self::Plan(plan) => f.debug_tuple("Injector::Plan").field(plan).finish(),
        }
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile the specialized injector for a binding's pattern
pub fn compile_argument_injector(binding: &HandlerBinding) -> Injector {
    let fields = binding.fields.as_slice();

    let specialized = match binding.pattern {
        HandlerPattern::NoParams => Some(no_params()),
        HandlerPattern::RequestOnly => request_only(fields),
        HandlerPattern::PathOnly => single_view(fields, Source::Path),
        HandlerPattern::QueryOnly => single_view(fields, Source::Query),
        HandlerPattern::BodyOnly => body_only(fields),
        HandlerPattern::Simple => path_and_query(fields),
        HandlerPattern::WithDeps => {
            return Injector::Plan(Arc::new(ExtractionPlan::new(binding, binding.concurrent_dependencies)));
        }
        HandlerPattern::Full => None,
    };

    match specialized {
        Some(f) => Injector::Sync(f),
        None => {
            if binding.pattern != HandlerPattern::Full {
                tracing::warn!(
                    handler = %binding.handler_name,
                    pattern = %binding.pattern,
                    "Fields do not match pattern, using full injector"
                );
            }
            compile_full_injector(binding)
        }
    }
}

/// Compile the generic injector that handles every legal field combination
pub fn compile_full_injector(binding: &HandlerBinding) -> Injector {
    Injector::Plan(Arc::new(ExtractionPlan::new(binding, false)))
}

fn no_params() -> SyncInjectFn {
    Arc::new(|_: &Request, _: &RequestScope| Ok(CallArgs::new()))
}

fn request_only(fields: &[FieldDefinition]) -> Option<SyncInjectFn> {
    let [field] = fields else { return None };
    let pass = field.pass_kind();
    let name = field.name().to_string();
    let injector: SyncInjectFn = Arc::new(move |request: &Request, _: &RequestScope| {
        let mut args = CallArgs::with_capacity(1);
        args.push(pass, &name, Arg::Request(request.clone()));
        Ok(args)
    });
    Some(injector)
}

struct Entry {
    extract: ParamFn,
    pass: PassKind,
    name: String,
}

fn param_entry(field: &FieldDefinition) -> Option<Entry> {
    let extract = match field.extractor()? {
        Extractor::Path(f) | Extractor::Query(f) => Arc::clone(f),
        _ => return None,
    };
    Some(Entry {
        extract,
        pass: field.pass_kind(),
        name: field.name().to_string(),
    })
}

fn single_view(fields: &[FieldDefinition], source: Source) -> Option<SyncInjectFn> {
    let entries = fields
        .iter()
        .map(|field| (field.source() == source).then(|| param_entry(field)).flatten())
        .collect::<Option<Vec<_>>>()?;
    let view: fn(&Request) -> &ParamMap = match source {
        Source::Path => Request::path_params,
        _ => Request::query_params,
    };

    let injector: SyncInjectFn = Arc::new(move |request: &Request, _: &RequestScope| {
        let params = view(request);
        let mut args = CallArgs::with_capacity(entries.len());
        let mut errors = ValidationErrors::new();
        for entry in &entries {
            if let Some(arg) = collect((entry.extract)(params), &mut errors)? {
                args.push(entry.pass, &entry.name, arg);
            }
        }
        errors.into_result()?;
        Ok(args)
    });
    Some(injector)
}

fn path_and_query(fields: &[FieldDefinition]) -> Option<SyncInjectFn> {
    let entries = fields
        .iter()
        .map(|field| Some((field.source(), param_entry(field)?)))
        .collect::<Option<Vec<_>>>()?;

    let injector: SyncInjectFn = Arc::new(move |request: &Request, _: &RequestScope| {
        let mut args = CallArgs::with_capacity(entries.len());
        let mut errors = ValidationErrors::new();
        for (source, entry) in &entries {
            let params = match source {
                Source::Path => request.path_params(),
                _ => request.query_params(),
            };
            if let Some(arg) = collect((entry.extract)(params), &mut errors)? {
                args.push(entry.pass, &entry.name, arg);
            }
        }
        errors.into_result()?;
        Ok(args)
    });
    Some(injector)
}

fn body_only(fields: &[FieldDefinition]) -> Option<SyncInjectFn> {
    let [field] = fields else { return None };
    let extract: BodyFn = match field.extractor()? {
        Extractor::Body(f) => Arc::clone(f),
        _ => return None,
    };

    let injector: SyncInjectFn = match field.pass_kind() {
        PassKind::Positional => Arc::new(move |request: &Request, scope: &RequestScope| {
            Ok(CallArgs {
                args: vec![extract(request, scope)?],
                kwargs: HashMap::new(),
            })
        }),
        PassKind::Keyword => {
            let name = field.name().to_string();
            Arc::new(move |request: &Request, scope: &RequestScope| {
                let mut kwargs = HashMap::with_capacity(1);
                kwargs.insert(name.clone(), extract(request, scope)?);
                Ok(CallArgs {
                    args: Vec::new(),
                    kwargs,
                })
            })
        }
    };
    Some(injector)
}

/// Fold a validation failure into `errors`, passing any other error through
fn collect(result: ApiResult<Arg>, errors: &mut ValidationErrors) -> ApiResult<Option<Arg>> {
    match result {
        Ok(arg) => Ok(Some(arg)),
        Err(ApiError::Validation(e)) => {
            errors.merge(e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// Extraction plan
// ============================================================================

enum StepAction {
    Request,
    Extract(Extractor),
    Dependency(DependencySpec),
}

struct Step {
    name: String,
    pass: PassKind,
    action: StepAction,
}

/// Flat sequence of tagged steps, one per field, in declaration order
pub struct ExtractionPlan {
    steps: Vec<Step>,
    concurrent: bool,
    needs_form: bool,
}

impl ExtractionPlan {
    fn new(binding: &HandlerBinding, concurrent: bool) -> Self {
        let steps = binding
            .fields
            .iter()
            .filter_map(|field| {
                let action = match (field.source(), field.extractor(), field.dependency()) {
                    (Source::Request, _, _) => StepAction::Request,
                    (_, _, Some(dependency)) => StepAction::Dependency(dependency.clone()),
                    (_, Some(extractor), _) => StepAction::Extract(extractor.clone()),
                    _ => return None,
                };
                Some(Step {
                    name: field.name().to_string(),
                    pass: field.pass_kind(),
                    action,
                })
            })
            .collect();

        Self {
            steps,
            concurrent,
            needs_form: binding.flags.needs_form_parsing,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Async dependency steps eligible for concurrent resolution
    fn concurrent_steps(&self) -> Vec<(usize, &DependencySpec)> {
        if !self.concurrent {
            return Vec::new();
        }
        let steps: Vec<_> = self
            .steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| match &step.action {
                StepAction::Dependency(dep) if dep.is_async() => Some((i, dep)),
                _ => None,
            })
            .collect();
        if steps.len() < 2 {
            return Vec::new();
        }
        steps
    }

    async fn execute(&self, request: &Request, scope: &RequestScope) -> ApiResult<CallArgs> {
        if self.needs_form {
            request.form();
        }

        // Concurrent results are applied in declaration order below, so a
        // failing dependency reports the same errors as the sequential plan.
        let mut resolved: Vec<Option<ApiResult<Arg>>> = std::iter::repeat_with(|| None).take(self.steps.len()).collect();
        let early = self.concurrent_steps();
        if !early.is_empty() {
            let results = join_all(early.iter().map(|(_, dep)| dep.resolve(request, scope))).await;
            for ((i, _), result) in early.iter().zip(results) {
                resolved[*i] = Some(result);
            }
        }

        let mut args = CallArgs::with_capacity(self.steps.len());
        let mut errors = ValidationErrors::new();
        for (step, ready) in self.steps.iter().zip(resolved) {
            let result = match (&step.action, ready) {
                (_, Some(result)) => result,
                (StepAction::Request, None) => Ok(Arg::Request(request.clone())),
                (StepAction::Extract(extractor), None) => match collect(extractor.apply(request, scope), &mut errors)? {
                    Some(arg) => Ok(arg),
                    None => continue,
                },
                (StepAction::Dependency(dep), None) => dep.resolve(request, scope).await,
            };
            let arg = match result {
                Ok(arg) => arg,
                Err(ApiError::Validation(e)) => {
                    errors.merge(e);
                    return Err(errors.into());
                }
                Err(e) => return Err(e),
            };
            args.push(step.pass, &step.name, arg);
        }

        errors.into_result()?;
        Ok(args)
    }
}

impl fmt::Debug for ExtractionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self
            .steps
            .iter()
            .map(|step| match &step.action {
                StepAction::Request => format!("{}: request", step.name),
                StepAction::Extract(extractor) => format!("{}: {}", step.name, extractor.source()),
                StepAction::Dependency(dep) => format!("{}: depends({})", step.name, dep.name()),
            })
            .collect();
        f.debug_struct("ExtractionPlan")
            .field("steps", &steps)
            .field("concurrent", &self.concurrent)
            .field("needs_form", &self.needs_form)
            .finish()
    }
}
