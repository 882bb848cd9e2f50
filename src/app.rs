//! Application façade: dependency registry, route table and engine
//! configuration behind one builder.
//!
//! ```rust
//! use brrtfn::app::App;
//! use brrtfn::dependencies::{Dependency, Handler};
//! use brrtfn::params::Param;
//! use brrtfn::request::Request;
//!
//! # fn main() -> Result<(), brrtfn::errors::RegistrationError> {
//! let mut app = App::new();
//! app.dependency(Dependency::value("greeting", String::from("hello")));
//! app.get(
//!     "/greet/{name}",
//!     Handler::sync("greet", |v| {
//!         Ok(format!("{} {}", v.dep::<String>("greeting")?, v.get::<String>("name")?))
//!     })
//!     .params([Param::depends("greeting", "greeting"), Param::string("name")]),
//! )?;
//!
//! let dispatcher = app.build();
//! # futures::executor::block_on(async {
//! let response = dispatcher.handle(Request::get("/greet/ann")).await;
//! assert_eq!(response.body, "hello ann");
//! # });
//! # Ok(())
//! # }
//! ```

use crate::dependencies::{Dependency, DependencyRegistry, Handler};
use crate::dispatcher::Dispatcher;
use crate::errors::RegistrationError;
use crate::router::{Route, RouteOptions, Router};
use crate::runtime_config::EngineConfig;
use crate::validator::SchemaValidator;
use crate::validator_cache::ValidatorCache;
use std::sync::Arc;

/// Registration-time builder. Consumed by [`App::build`].
#[derive(Debug)]
pub struct App {
    router: Router,
    config: EngineConfig,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Configuration from `BRRTFN_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(EngineConfig::from_env())
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let validator = SchemaValidator::new(ValidatorCache::new(config.schema_cache));
        Self {
            router: Router::with_validator(DependencyRegistry::new(), Arc::new(validator)),
            config,
        }
    }

    /// Make `dep` available to routes registered after this call.
    pub fn dependency(&mut self, dep: Dependency) -> &mut Self {
        self.router.registry_mut().register(dep);
        self
    }

    /// Register a route.
    ///
    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn route<S: AsRef<str>>(
        &mut self,
        methods: &[S],
        template: &str,
        handler: Handler,
    ) -> Result<&mut Self, RegistrationError> {
        self.router.register(methods, template, handler, None)?;
        Ok(self)
    }

    /// Register a route with a name, response shape or overrides.
    ///
    /// # Errors
    ///
    /// See [`Router::register_with`].
    pub fn route_with<S: AsRef<str>>(
        &mut self,
        methods: &[S],
        template: &str,
        handler: Handler,
        options: RouteOptions,
    ) -> Result<Arc<Route>, RegistrationError> {
        self.router.register_with(methods, template, handler, options)
    }

    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn get(&mut self, template: &str, handler: Handler) -> Result<&mut Self, RegistrationError> {
        self.route(&["GET"], template, handler)
    }

    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn post(&mut self, template: &str, handler: Handler) -> Result<&mut Self, RegistrationError> {
        self.route(&["POST"], template, handler)
    }

    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn put(&mut self, template: &str, handler: Handler) -> Result<&mut Self, RegistrationError> {
        self.route(&["PUT"], template, handler)
    }

    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn patch(&mut self, template: &str, handler: Handler) -> Result<&mut Self, RegistrationError> {
        self.route(&["PATCH"], template, handler)
    }

    /// # Errors
    ///
    /// See [`Router::register`].
    pub fn delete(&mut self, template: &str, handler: Handler) -> Result<&mut Self, RegistrationError> {
        self.route(&["DELETE"], template, handler)
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Freeze the route table.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        self.router.dump_routes();
        Dispatcher::with_config(self.router, self.config)
    }
}
