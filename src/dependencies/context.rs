use super::callable::{Finalizer, Produced};
use super::graph::CacheKey;
use crate::errors::FinalizerError;
use crate::ids::RequestId;
use crate::path::PathValues;
use crate::request::Request;
use crate::validator::FieldError;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Per-request resolution state.
///
/// Owned by the single task handling the request and never shared. Holds
/// the request, converted path values, the result cache, the stack of
/// pending finalizers and the accumulated validation errors.
///
/// Finalizers run exactly once: through [`ResolutionContext::close`] on the
/// normal path, or from `Drop` if the context is abandoned mid-request
/// (cancellation).
pub struct ResolutionContext {
    request_id: RequestId,
    request: Arc<Request>,
    path_values: PathValues,
    cache: HashMap<CacheKey, Produced>,
    invalid: HashSet<CacheKey>,
    finalizers: Vec<(Arc<str>, Finalizer)>,
    errors: Vec<FieldError>,
}

impl std::fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("request_id", &self.request_id)
            .field("path_values", &self.path_values)
            .field("cached", &self.cache.len())
            .field("invalid", &self.invalid.len())
            .field("pending_finalizers", &self.finalizers.len())
            .field("errors", &self.errors)
            .finish()
    }
}

impl ResolutionContext {
    #[must_use]
    pub fn new(request: Arc<Request>, path_values: PathValues) -> Self {
        Self {
            request_id: request.request_id(),
            request,
            path_values,
            cache: HashMap::new(),
            invalid: HashSet::new(),
            finalizers: Vec::new(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    #[must_use]
    pub fn path_value(&self, name: &str) -> Option<&Value> {
        self.path_values
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    #[must_use]
    pub fn cached(&self, key: &CacheKey) -> Option<&Produced> {
        self.cache.get(key)
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.len()
    }

    pub(crate) fn store(&mut self, key: CacheKey, value: Produced) {
        self.cache.insert(key, value);
    }

    /// Whether `key` already failed input validation in this request.
    #[must_use]
    pub fn is_invalid(&self, key: &CacheKey) -> bool {
        self.invalid.contains(key)
    }

    pub(crate) fn mark_invalid(&mut self, key: CacheKey) {
        self.invalid.insert(key);
    }

    pub(crate) fn push_finalizer(&mut self, dependency: Arc<str>, finalizer: Finalizer) {
        debug!(
            request_id = %self.request_id,
            dependency = %dependency,
            pending = self.finalizers.len() + 1,
            "Finalizer registered"
        );
        self.finalizers.push((dependency, finalizer));
    }

    pub(crate) fn push_error(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub(crate) fn extend_errors(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.errors.extend(errors);
    }

    /// Drop the leading `alias.` from fields reported since `start`. Used
    /// when a single body parameter is validated against the whole body, so
    /// its nested fields are top-level body fields.
    pub(crate) fn unnest_errors_since(&mut self, start: usize, alias: &str) {
        let prefix = format!("{alias}.");
        for error in self.errors.iter_mut().skip(start) {
            if let Some(rest) = error.field.strip_prefix(&prefix) {
                error.field = rest.to_owned();
            }
        }
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub(crate) fn errors_since(&self, start: usize) -> Vec<FieldError> {
        self.errors.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Run every pending finalizer in reverse registration order.
    ///
    /// All finalizers run even if some fail; the first failure is reported.
    /// A second call is a no-op.
    ///
    /// # Errors
    ///
    /// [`FinalizerError`] if any finalizer returned an error or panicked.
    pub async fn close(&mut self) -> Result<(), FinalizerError> {
        let finalizers = std::mem::take(&mut self.finalizers);
        if finalizers.is_empty() {
            return Ok(());
        }
        run_finalizers(self.request_id, finalizers).await
    }
}

async fn run_finalizers(
    request_id: RequestId,
    finalizers: Vec<(Arc<str>, Finalizer)>,
) -> Result<(), FinalizerError> {
    let mut first: Option<(Arc<str>, String)> = None;
    let mut failed = 0usize;

    for (dependency, finalizer) in finalizers.into_iter().rev() {
        let outcome = AssertUnwindSafe(async move { finalizer().await })
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => {
                debug!(request_id = %request_id, dependency = %dependency, "Finalizer completed");
                continue;
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => panic_message(panic.as_ref()),
        };
        error!(
            request_id = %request_id,
            dependency = %dependency,
            error = %failure,
            "Finalizer failed"
        );
        failed += 1;
        if first.is_none() {
            first = Some((dependency, failure));
        }
    }

    match first {
        None => Ok(()),
        Some((dependency, message)) => Err(FinalizerError {
            dependency: dependency.to_string(),
            message,
            failed,
        }),
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

impl Drop for ResolutionContext {
    fn drop(&mut self) {
        let finalizers = std::mem::take(&mut self.finalizers);
        if finalizers.is_empty() {
            return;
        }
        let request_id = self.request_id;
        warn!(
            request_id = %request_id,
            pending = finalizers.len(),
            "Resolution context dropped with pending finalizers"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = run_finalizers(request_id, finalizers).await {
                        error!(request_id = %request_id, error = %err, "Deferred cleanup failed");
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(run_finalizers(request_id, finalizers)) {
                    error!(request_id = %request_id, error = %err, "Deferred cleanup failed");
                }
            }
        }
    }
}
