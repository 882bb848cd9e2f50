//! # Dependencies Module
//!
//! Declared dependencies, the registration-time graph builder and the
//! request-time resolver.
//!
//! ## Overview
//!
//! A route's handler declares its inputs as [`Param`](crate::params::Param)s.
//! Some of those are sub-dependencies: named [`Dependency`] callables looked
//! up in a [`DependencyRegistry`] (or a per-route [`Overrides`] map). At
//! registration [`build_dependant`] turns the declarations into a
//! [`Dependant`] tree, rejecting unknown keys and cycles. At request time
//! [`Resolver`] walks that tree against a fresh [`ResolutionContext`].
//!
//! ## Dependency kinds
//!
//! | Kind | Constructor | Produces |
//! |---|---|---|
//! | plain | [`Dependency::plain`], [`Dependency::plain_sync`] | a value |
//! | scoped resource | [`Dependency::scoped`], [`Dependency::scoped_sync`] | a value plus a finalizer |
//!
//! The kind is fixed at declaration; the resolver never inspects a callable
//! to decide how to drive it.
//!
//! ## Per-request caching
//!
//! Each node carries a [`CacheKey`]: the dependency's identity plus the
//! sorted security scopes it was requested with. Within one request a
//! cacheable node whose key has already been resolved is not invoked again.
//! `Param::depends(..).no_cache()` opts a use site out.
//!
//! ## Cleanup
//!
//! Finalizers of scoped resources are pushed onto the context as the
//! resources are produced and run in reverse order when the context closes,
//! exactly once, whether the request succeeded, failed validation, failed in
//! a callable, timed out or was dropped.
//!
//! ## Example
//!
//! ```rust
//! use brrtfn::dependencies::{Dependency, DependencyRegistry, Scoped};
//! use brrtfn::params::Param;
//!
//! let registry = DependencyRegistry::new()
//!     .with(Dependency::scoped_sync("db", |_| {
//!         Ok(Scoped::with_sync_cleanup(String::from("conn"), || Ok(())))
//!     }))
//!     .with(
//!         Dependency::plain_sync("current_user", |values| {
//!             let db = values.dep::<String>("db")?;
//!             Ok(format!("user via {db}"))
//!         })
//!         .param(Param::depends("db", "db")),
//!     );
//! assert_eq!(registry.len(), 2);
//! ```

mod callable;
mod context;
mod graph;
mod registry;
mod resolver;
mod values;
#[cfg(test)]
mod tests;

pub use callable::{
    Callable, Dependency, DependencyId, DependencyKind, Finalizer, Handler, Produced, Scoped,
};
pub use context::ResolutionContext;
pub use graph::{build_dependant, CacheKey, Dependant};
pub use registry::{DependencyRegistry, Overrides};
pub use resolver::{Resolver, Solved};
pub use values::Values;

pub(crate) use context::panic_message;
