//! Router core - route table and the per-request match loop.
//!
//! Matching is a linear scan in registration order. The first route whose
//! method set contains the request method and whose template matches the
//! path wins; later routes are never consulted.

use crate::dependencies::{build_dependant, Dependant, DependencyRegistry, Handler, Overrides};
use crate::errors::RegistrationError;
use crate::path::{PathTemplate, PathValues};
use crate::response::ResponseShape;
use crate::validator::{SchemaValidator, ValueValidator};
use http::Method;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Method set of one route. Few routes accept more than a handful.
pub type MethodSet = SmallVec<[Method; 4]>;

/// A registered route. Immutable once built and shared by every request.
pub struct Route {
    name: Arc<str>,
    methods: MethodSet,
    template: PathTemplate,
    dependant: Dependant,
    handler: Handler,
    response_shape: Option<ResponseShape>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("template", &self.template.as_str())
            .field("nodes", &self.dependant.node_count())
            .field("shaped", &self.response_shape.is_some())
            .finish()
    }
}

impl Route {
    /// Route name; the handler's name unless set through [`RouteOptions::name`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    #[must_use]
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// The handler's dependency graph.
    #[must_use]
    pub fn dependant(&self) -> &Dependant {
        &self.dependant
    }

    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    #[must_use]
    pub fn response_shape(&self) -> Option<&ResponseShape> {
        self.response_shape.as_ref()
    }
}

/// Optional per-route settings for [`Router::register_with`].
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub name: Option<String>,
    pub response_shape: Option<Value>,
    pub overrides: Option<Overrides>,
}

impl RouteOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn response_shape(mut self, schema: Value) -> Self {
        self.response_shape = Some(schema);
        self
    }

    #[must_use]
    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// A successful match: the route plus the converted path values.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub path_values: PathValues,
}

impl RouteMatch {
    #[must_use]
    pub fn path_value(&self, name: &str) -> Option<&Value> {
        self.path_values
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }
}

/// Ordered route table plus the registry routes are built against.
#[derive(Clone)]
pub struct Router {
    routes: Vec<Arc<Route>>,
    registry: DependencyRegistry,
    validator: Arc<dyn ValueValidator>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("dependencies", &self.registry.len())
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(DependencyRegistry::new())
    }
}

pub(crate) fn parse_methods<S: AsRef<str>>(
    template: &str,
    methods: &[S],
) -> Result<MethodSet, RegistrationError> {
    let mut set = MethodSet::new();
    for raw in methods {
        let upper = raw.as_ref().trim().to_ascii_uppercase();
        let method = Method::from_bytes(upper.as_bytes())
            .map_err(|_| RegistrationError::UnsupportedMethod(raw.as_ref().to_owned()))?;
        if !set.contains(&method) {
            set.push(method);
        }
    }
    if set.is_empty() {
        return Err(RegistrationError::NoMethods(template.to_owned()));
    }
    Ok(set)
}

impl Router {
    /// Router validating with the default [`SchemaValidator`].
    #[must_use]
    pub fn new(registry: DependencyRegistry) -> Self {
        Self::with_validator(registry, Arc::new(SchemaValidator::default()))
    }

    #[must_use]
    pub fn with_validator(registry: DependencyRegistry, validator: Arc<dyn ValueValidator>) -> Self {
        Self {
            routes: Vec::new(),
            registry,
            validator,
        }
    }

    /// Registry used by routes registered from now on. Routes already
    /// registered keep the graph they were built with.
    pub fn registry_mut(&mut self) -> &mut DependencyRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    /// Register `handler` for `methods` on `template`.
    ///
    /// # Errors
    ///
    /// Any [`RegistrationError`]: malformed template, unknown method,
    /// cyclic or unknown dependency, invalid parameter declaration.
    pub fn register<S: AsRef<str>>(
        &mut self,
        methods: &[S],
        template: &str,
        handler: Handler,
        overrides: Option<&Overrides>,
    ) -> Result<Arc<Route>, RegistrationError> {
        let options = RouteOptions {
            overrides: overrides.cloned(),
            ..RouteOptions::default()
        };
        self.register_with(methods, template, handler, options)
    }

    /// Like [`Router::register`] with a name and response shape.
    ///
    /// # Errors
    ///
    /// As [`Router::register`], plus
    /// [`RegistrationError::InvalidResponseShape`] when the shape does not
    /// compile.
    pub fn register_with<S: AsRef<str>>(
        &mut self,
        methods: &[S],
        template: &str,
        handler: Handler,
        options: RouteOptions,
    ) -> Result<Arc<Route>, RegistrationError> {
        let methods = parse_methods(template, methods)?;
        let compiled = PathTemplate::compile(template)?;
        let dependant = build_dependant(
            &compiled,
            &handler,
            &self.registry,
            options.overrides.as_ref(),
            self.validator.as_ref(),
        )?;
        let name: Arc<str> = options
            .name
            .map_or_else(|| Arc::clone(handler.name()), Arc::from);
        let response_shape = options
            .response_shape
            .map(|schema| self.validator.response_shape(schema))
            .transpose()
            .map_err(|reason| RegistrationError::InvalidResponseShape {
                route: name.to_string(),
                reason,
            })?;

        info!(
            route = %name,
            methods = ?methods,
            template = %compiled,
            nodes = dependant.node_count(),
            depth = dependant.depth(),
            params = dependant.flat_params().len(),
            shaped = response_shape.is_some(),
            "Route registered"
        );

        let route = Arc::new(Route {
            name,
            methods,
            template: compiled,
            dependant,
            handler,
            response_shape,
        });
        self.routes.push(Arc::clone(&route));
        Ok(route)
    }

    /// First route, in registration order, accepting `method` on `path`.
    ///
    /// A path whose segment fails conversion (e.g. `abc` for `{id:int}`) is a
    /// non-match for that route and the scan continues.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        for route in &self.routes {
            if !route.accepts(method) {
                continue;
            }
            match route.template.try_match(path) {
                Ok(Some(path_values)) => {
                    debug!(
                        method = %method,
                        path = %path,
                        route = %route.name,
                        template = %route.template,
                        path_params = ?path_values,
                        "Route matched"
                    );
                    return Some(RouteMatch {
                        route: Arc::clone(route),
                        path_values,
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(
                        route = %route.name,
                        path = %path,
                        error = %err,
                        "Path segment failed conversion, skipping route"
                    );
                }
            }
        }
        debug!(method = %method, path = %path, "No route matched");
        None
    }

    #[must_use]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    #[must_use]
    pub fn validator(&self) -> &Arc<dyn ValueValidator> {
        &self.validator
    }

    /// Build a path for the route called `name` from parameter values.
    #[must_use]
    pub fn url_for(&self, name: &str, values: &Map<String, Value>) -> Option<String> {
        self.routes
            .iter()
            .find(|r| r.name.as_ref() == name)
            .and_then(|r| r.template.render(values))
    }

    /// Log the routing table at `info`.
    pub fn dump_routes(&self) {
        info!(count = self.routes.len(), "Routing table");
        for route in &self.routes {
            let methods: Vec<&str> = route.methods.iter().map(Method::as_str).collect();
            info!(
                methods = %methods.join(","),
                template = %route.template,
                route = %route.name,
                "Route"
            );
        }
    }
}
