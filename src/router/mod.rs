//! # Router Module
//!
//! Route registration and request matching.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling a route's path template and building its dependency graph at
//!   registration, failing fast on malformed templates, unknown methods and
//!   cyclic or unknown dependencies
//! - Matching incoming requests to routes by method and path
//! - Handing converted path values to the dispatcher
//!
//! ## Architecture
//!
//! Two phases:
//!
//! 1. **Registration**: `register(methods, template, handler, overrides)`
//!    compiles the template, classifies every declared parameter and builds
//!    the [`Dependant`](crate::dependencies::Dependant) tree. Nothing is
//!    resolved lazily per request.
//!
//! 2. **Matching**: routes are tried in registration order. The first route
//!    that accepts the method and whose template matches the path wins; there
//!    is no priority reordering and no backtracking. A path segment that fails
//!    conversion is a non-match for that route only.
//!
//! ## Example
//!
//! ```rust
//! use brrtfn::dependencies::{DependencyRegistry, Handler};
//! use brrtfn::params::Param;
//! use brrtfn::router::Router;
//! use http::Method;
//!
//! let mut router = Router::new(DependencyRegistry::new());
//! router
//!     .register(
//!         &["GET"],
//!         "/users/{id:int}",
//!         Handler::sync("get_user", |v| Ok(v.get::<i64>("id")?)).param(Param::integer("id")),
//!         None,
//!     )
//!     .unwrap();
//!
//! let hit = router.route(&Method::GET, "/users/42").unwrap();
//! assert_eq!(hit.route.name(), "get_user");
//! assert_eq!(hit.path_value("id"), Some(&serde_json::json!(42)));
//! assert!(router.route(&Method::GET, "/users/abc").is_none());
//! ```

mod core;
#[cfg(test)]
mod tests;

pub use core::{MethodSet, Route, RouteMatch, RouteOptions, Router};
