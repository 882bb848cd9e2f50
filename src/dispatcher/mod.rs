//! # Dispatcher Module
//!
//! Turns one [`Request`](crate::request::Request) into one
//! [`DispatchOutcome`](crate::response::DispatchOutcome).
//!
//! ## Request Flow
//!
//! 1. The router matches method and path, first registered route wins
//! 2. A fresh [`ResolutionContext`](crate::dependencies::ResolutionContext)
//!    is opened for the request
//! 3. The route's dependency tree is resolved; every validation error is
//!    collected in one pass
//! 4. If nothing failed validation the handler runs with the resolved values
//! 5. The context closes, running scoped-resource finalizers in reverse order
//! 6. The handler's result is filtered through the route's response shape
//!
//! ## Error Handling
//!
//! | Situation | Outcome | Status |
//! |---|---|---|
//! | no route for method + path | `NotFound` | 404 |
//! | one or more invalid parameters | `ValidationFailed` | 422 |
//! | handler or dependency returned `HttpError` | `HttpError` | chosen |
//! | callable error, panic, timeout, failed finalizer, shape mismatch | `ServerError` | 500 |
//!
//! Panics in handlers and dependencies are caught and reported as server
//! errors; finalizers registered before the panic still run.
//!
//! ## Example
//!
//! ```rust
//! use brrtfn::dependencies::{DependencyRegistry, Handler};
//! use brrtfn::dispatcher::Dispatcher;
//! use brrtfn::params::Param;
//! use brrtfn::request::Request;
//! use brrtfn::router::Router;
//!
//! # futures::executor::block_on(async {
//! let mut router = Router::new(DependencyRegistry::new());
//! router
//!     .register(
//!         &["GET"],
//!         "/hello",
//!         Handler::sync("hello", |v| Ok(format!("hello {}", v.get::<String>("name")?)))
//!             .param(Param::string("name").default("world")),
//!         None,
//!     )
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(router);
//! let response = dispatcher.handle(Request::get("/hello?name=brrt")).await;
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body, "hello brrt");
//! # });
//! ```

mod core;

pub use core::Dispatcher;
