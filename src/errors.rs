//! Error taxonomy.
//!
//! Registration errors stop startup. Validation errors are data
//! ([`FieldError`](crate::validator::FieldError)), never raised. Everything
//! that aborts a single request is a [`ResolutionFailure`].

use crate::path::MalformedTemplateError;
use crate::response::HttpError;
use std::time::Duration;
use thiserror::Error;

/// Raised by route registration. Never produced at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    MalformedTemplate(#[from] MalformedTemplateError),

    #[error("cyclic dependency detected: {path}")]
    CyclicDependency {
        /// Key of the dependency that closed the cycle.
        key: String,
        /// Rendered build stack, e.g. `"a -> b -> a"`.
        path: String,
    },

    #[error("dependency '{key}' required by '{required_by}' is not registered")]
    UnknownDependency { key: String, required_by: String },

    #[error("invalid parameter '{name}' on '{owner}': {reason}")]
    InvalidParameter {
        owner: String,
        name: String,
        reason: String,
    },

    #[error("unsupported HTTP method '{0}'")]
    UnsupportedMethod(String),

    #[error("route '{0}' declares no HTTP methods")]
    NoMethods(String),

    #[error("response shape for route '{route}' is not a valid schema: {reason}")]
    InvalidResponseShape { route: String, reason: String },
}

/// Raised when one or more scoped-resource finalizers fail on context close.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{failed} finalizer(s) failed; first failure in '{dependency}': {message}")]
pub struct FinalizerError {
    pub dependency: String,
    pub message: String,
    pub failed: usize,
}

/// Aborts a single request. Mapped to a server error unless it carries an
/// [`HttpError`] raised deliberately by user code.
#[derive(Debug, Clone, Error)]
pub enum ResolutionFailure {
    /// A dependency or handler returned an [`HttpError`].
    #[error("request rejected: {0}")]
    Rejected(HttpError),

    #[error("dependency '{dependency}' failed: {message}")]
    Dependency { dependency: String, message: String },

    #[error("handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    #[error("'{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("request exceeded its time budget of {0:?}")]
    Timeout(Duration),

    #[error("response for '{handler}' does not match its declared shape: {message}")]
    ResponseShape { handler: String, message: String },

    #[error("resolver misuse: {0}")]
    Misuse(String),

    #[error(transparent)]
    Finalizer(#[from] FinalizerError),
}

impl ResolutionFailure {
    /// Classify an error returned by a dependency callable.
    pub(crate) fn from_dependency(dependency: &str, err: anyhow::Error) -> Self {
        match err.downcast::<HttpError>() {
            Ok(http) => Self::Rejected(http),
            Err(err) => Self::Dependency {
                dependency: dependency.to_owned(),
                message: format!("{err:#}"),
            },
        }
    }

    /// Classify an error returned by a handler.
    pub(crate) fn from_handler(handler: &str, err: anyhow::Error) -> Self {
        match err.downcast::<HttpError>() {
            Ok(http) => Self::Rejected(http),
            Err(err) => Self::Handler {
                handler: handler.to_owned(),
                message: format!("{err:#}"),
            },
        }
    }
}
