//! # brrtfn
//!
//! **brrtfn** is the request-handling core of a serverless HTTP function: given a
//! normalised request it finds the route, resolves the route's declared
//! dependencies (nested, cached per request, scoped resources with guaranteed
//! cleanup), extracts and validates every typed parameter, invokes the handler
//! and shapes its result.
//!
//! ## Overview
//!
//! Everything structural happens once, at registration: path templates are
//! compiled, handler and dependency parameters are classified, and each
//! route's dependency graph is built and checked for cycles and unknown keys.
//! Request time is a walk over immutable, shared structures plus one
//! [`ResolutionContext`](dependencies::ResolutionContext) owned by the request.
//!
//! ## Architecture
//!
//! Leaf first:
//!
//! - **[`path`]** - path template compiler and segment converters
//! - **[`params`]** - parameter declarations and the classifier that decides
//!   where each value comes from
//! - **[`dependencies`]** - dependency declarations, graph builder, per-request
//!   context and resolver
//! - **[`validator`]** / **[`validator_cache`]** - the validation seam and its
//!   JSON Schema implementation with compiled-schema caching
//! - **[`router`]** - route registration and first-match routing
//! - **[`dispatcher`]** - request lifecycle, timeouts, panic recovery, cleanup
//! - **[`request`]** / **[`response`]** - the request the engine consumes and the
//!   outcomes it produces
//! - **[`security`]** - bearer credentials as a dependency
//! - **[`app`]** - builder tying registry, router and configuration together
//! - **[`runtime_config`]**, **[`logging`]**, **[`ids`]** - ambient support
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtfn::app::App;
//! use brrtfn::dependencies::{Dependency, Handler, Scoped};
//! use brrtfn::params::Param;
//! use brrtfn::request::Request;
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut app = App::new();
//! app.dependency(Dependency::scoped_sync("db", |_| {
//!     Ok(Scoped::with_sync_cleanup(String::from("conn-1"), || Ok(())))
//! }));
//! app.post(
//!     "/items/{id:int}",
//!     Handler::sync("update_item", |v| {
//!         Ok(json!({
//!             "id": v.get::<i64>("id")?,
//!             "price": v.get::<f64>("price")?,
//!             "conn": *v.dep::<String>("db")?,
//!         }))
//!     })
//!     .params([
//!         Param::integer("id"),
//!         Param::number("price").body().minimum(0),
//!         Param::depends("db", "db"),
//!     ]),
//! )?;
//! let dispatcher = app.build();
//!
//! # futures::executor::block_on(async {
//! let ok = dispatcher
//!     .handle(Request::post("/items/7").with_json(&json!(9.5)))
//!     .await;
//! assert_eq!(ok.status, 200);
//! assert_eq!(ok.body["conn"], "conn-1");
//!
//! let invalid = dispatcher
//!     .handle(Request::post("/items/7").with_json(&json!(-1)))
//!     .await;
//! assert_eq!(invalid.status, 422);
//! # });
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Model
//!
//! - Structural problems are [`errors::RegistrationError`]s and stop startup.
//! - Validation problems are collected as
//!   [`validator::FieldError`]s, all of them in one pass, and reported together.
//! - Anything else that aborts a request is an [`errors::ResolutionFailure`]
//!   and maps to a server error, except an [`response::HttpError`] raised on
//!   purpose by user code, which keeps its status.

pub mod app;
pub mod dependencies;
pub mod dispatcher;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod params;
pub mod path;
pub mod request;
pub mod response;
pub mod router;
pub mod runtime_config;
pub mod security;
pub mod validator;
pub mod validator_cache;

pub use app::App;
pub use dependencies::{Dependency, Handler, Scoped, Values};
pub use dispatcher::Dispatcher;
pub use errors::{RegistrationError, ResolutionFailure};
pub use params::{Param, ParamType};
pub use request::Request;
pub use response::{DispatchOutcome, HandlerResponse, HttpError, Response};
pub use runtime_config::EngineConfig;
