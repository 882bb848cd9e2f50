use crate::dependencies::{panic_message, ResolutionContext, Resolver};
use crate::errors::ResolutionFailure;
use crate::ids::REQUEST_ID_HEADER;
use crate::request::Request;
use crate::response::{DispatchOutcome, HandlerResponse, Response};
use crate::router::{Route, RouteMatch, Router};
use crate::runtime_config::EngineConfig;
use crate::validator::{FieldError, ValueValidator};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// What running a matched route produced, before cleanup.
enum Ran {
    Replied(HandlerResponse),
    Invalid(Vec<FieldError>),
}

/// Dispatches requests against an immutable [`Router`].
///
/// Cheap to clone; every clone shares the route table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    config: EngineConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self::with_config(router, EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(router: Router, config: EngineConfig) -> Self {
        info!(
            routes = router.routes().len(),
            debug = config.debug,
            request_timeout_ms = ?config.request_timeout_ms,
            "Dispatcher ready"
        );
        Self {
            router: Arc::new(router),
            config,
        }
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Match, resolve, invoke and clean up one request.
    ///
    /// Finalizers registered during resolution always run before this
    /// returns, whatever the outcome. With a request timeout configured this
    /// must be polled inside a tokio runtime.
    pub async fn dispatch(&self, request: Request) -> DispatchOutcome {
        let span = info_span!(
            "dispatch",
            request_id = %request.request_id(),
            method = %request.method(),
            path = %request.path(),
        );
        self.dispatch_inner(request).instrument(span).await
    }

    /// [`Dispatcher::dispatch`] rendered as a JSON [`Response`] carrying an
    /// `x-request-id` header.
    pub async fn handle(&self, request: Request) -> Response {
        let request_id = request.request_id();
        let mut response = self.dispatch(request).await.into_response(self.config.debug);
        response.set_header(REQUEST_ID_HEADER, request_id.to_string());
        response
    }

    async fn dispatch_inner(&self, request: Request) -> DispatchOutcome {
        let start = Instant::now();
        let Some(RouteMatch { route, path_values }) =
            self.router.route(request.method(), request.path())
        else {
            info!(status = 404, "No route matched");
            return DispatchOutcome::NotFound;
        };

        let mut ctx = ResolutionContext::new(Arc::new(request), path_values);
        let validator = self.router.validator().as_ref();
        let result = match self.config.request_timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, run_guarded(&route, validator, &mut ctx)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            route = %route.name(),
                            timeout_ms = limit.as_millis(),
                            pending_finalizers = ctx.pending_finalizers(),
                            "Request timed out"
                        );
                        Err(ResolutionFailure::Timeout(limit))
                    }
                }
            }
            None => run_guarded(&route, validator, &mut ctx).await,
        };
        let closed = ctx.close().await;

        let outcome = match (result, closed) {
            (Ok(Ran::Replied(reply)), Ok(())) => DispatchOutcome::Success(reply),
            (Ok(Ran::Invalid(errors)), Ok(())) => {
                warn!(
                    route = %route.name(),
                    errors = errors.len(),
                    fields = ?errors.iter().map(|e| e.field.as_str()).collect::<Vec<_>>(),
                    "Request validation failed"
                );
                DispatchOutcome::ValidationFailed(errors)
            }
            (Ok(_), Err(cleanup)) => DispatchOutcome::ServerError(cleanup.into()),
            (Err(failure), _) => DispatchOutcome::from_failure(failure),
        };

        if let DispatchOutcome::ServerError(failure) = &outcome {
            error!(route = %route.name(), error = %failure, "Request failed");
        }
        info!(
            route = %route.name(),
            status = outcome.status(),
            outcome = outcome.kind(),
            duration_us = start.elapsed().as_micros(),
            cached = ctx.cache_len(),
            "Request dispatched"
        );
        outcome
    }
}

/// [`run`] with panics turned into [`ResolutionFailure::Panicked`].
async fn run_guarded(
    route: &Route,
    validator: &dyn ValueValidator,
    ctx: &mut ResolutionContext,
) -> Result<Ran, ResolutionFailure> {
    match AssertUnwindSafe(run(route, validator, ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ResolutionFailure::Panicked {
            name: route.name().to_owned(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

async fn run(
    route: &Route,
    validator: &dyn ValueValidator,
    ctx: &mut ResolutionContext,
) -> Result<Ran, ResolutionFailure> {
    let solved = Resolver::new(validator).resolve(route.dependant(), ctx).await?;
    if !solved.errors.is_empty() {
        return Ok(Ran::Invalid(solved.errors));
    }

    let handler = route.handler();
    let mut reply = handler
        .call(solved.values)
        .await
        .map_err(|err| ResolutionFailure::from_handler(handler.name(), err))?;

    if let Some(shape) = route.response_shape().filter(|_| !handler.has_custom_response()) {
        reply.body = shape.apply(reply.body).map_err(|message| {
            ResolutionFailure::ResponseShape {
                handler: handler.name().to_string(),
                message,
            }
        })?;
    }
    Ok(Ran::Replied(reply))
}
