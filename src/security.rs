//! HTTP bearer credentials as a dependency.
//!
//! [`http_bearer`] builds a [`Dependency`] that reads the `Authorization`
//! header and produces `Option<HttpCredentials>`. Register it once and
//! depend on it from handlers or from other dependencies (token decoding,
//! user lookup); security scopes requested at each use site are visible to
//! those dependencies through
//! [`Values::security_scopes`](crate::dependencies::Values::security_scopes)
//! and keep their cached results apart.
//!
//! ```rust
//! use brrtfn::dependencies::{Dependency, DependencyRegistry};
//! use brrtfn::params::Param;
//! use brrtfn::security::{http_bearer, HttpCredentials};
//!
//! let registry = DependencyRegistry::new()
//!     .with(http_bearer("bearer", true))
//!     .with(
//!         Dependency::plain_sync("current_user", |values| {
//!             let creds = values.dep::<Option<HttpCredentials>>("creds")?;
//!             let token = (*creds).as_ref().map(|c| c.credentials.clone());
//!             Ok(format!("{token:?} with scopes {:?}", values.security_scopes()))
//!         })
//!         .param(Param::depends("creds", "bearer")),
//!     );
//! assert!(registry.contains("current_user"));
//! ```

use crate::dependencies::{Dependency, Values};
use crate::response::HttpError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const AUTHORIZATION_HEADER: &str = "authorization";

/// `Authorization` header split at the first space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCredentials {
    pub scheme: String,
    pub credentials: String,
}

/// Split an `Authorization` value into `(scheme, param)` at the first space.
/// Missing parts are empty strings.
#[must_use]
pub fn authorization_scheme_param(value: Option<&str>) -> (&str, &str) {
    match value {
        None | Some("") => ("", ""),
        Some(v) => v.split_once(' ').unwrap_or((v, "")),
    }
}

/// Parse bearer credentials from a request.
///
/// # Errors
///
/// With `auto_error`, a 403 [`HttpError`]: `"Not authenticated"` when the
/// header is missing or incomplete, `"Invalid authentication credentials"`
/// when the scheme is not `Bearer`. Without it both cases yield `Ok(None)`.
pub fn bearer_credentials(values: &Values, auto_error: bool) -> anyhow::Result<Option<HttpCredentials>> {
    let header = values.request().header(AUTHORIZATION_HEADER);
    let (scheme, credentials) = authorization_scheme_param(header);

    if scheme.is_empty() || credentials.is_empty() {
        debug!(
            request_id = %values.request().request_id(),
            header_present = header.is_some(),
            "Bearer credentials missing"
        );
        return if auto_error {
            Err(HttpError::forbidden("Not authenticated").into())
        } else {
            Ok(None)
        };
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        debug!(
            request_id = %values.request().request_id(),
            scheme = %scheme,
            "Unsupported authorization scheme"
        );
        return if auto_error {
            Err(HttpError::forbidden("Invalid authentication credentials").into())
        } else {
            Ok(None)
        };
    }
    Ok(Some(HttpCredentials {
        scheme: scheme.to_owned(),
        credentials: credentials.to_owned(),
    }))
}

/// Dependency producing `Option<HttpCredentials>` from the bearer token.
#[must_use]
pub fn http_bearer(key: impl Into<Arc<str>>, auto_error: bool) -> Dependency {
    Dependency::plain_sync(key, move |values: Values| bearer_credentials(&values, auto_error))
}
