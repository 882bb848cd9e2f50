use super::callable::{Callable, DependencyId, DependencyKind, Handler};
use super::registry::{DependencyRegistry, Overrides};
use crate::errors::RegistrationError;
use crate::params::{classify, Classified, Location, Param, ParameterSpec};
use crate::path::PathTemplate;
use crate::validator::ValueValidator;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Identity of a resolved value within one request: the callable plus the
/// sorted, de-duplicated security scopes it was requested with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    id: DependencyId,
    scopes: Vec<String>,
}

impl CacheKey {
    #[must_use]
    pub fn new(id: DependencyId, scopes: &[String]) -> Self {
        let mut scopes = scopes.to_vec();
        scopes.sort_unstable();
        scopes.dedup();
        Self { id, scopes }
    }

    #[must_use]
    pub fn id(&self) -> DependencyId {
        self.id
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.scopes.is_empty() {
            write!(f, "[{}]", self.scopes.join(","))?;
        }
        Ok(())
    }
}

/// One node of a route's dependency graph.
///
/// The root node wraps the handler and has no callable; every other node
/// wraps a dependency. Built once at registration, then shared read-only by
/// every request on the route.
#[derive(Debug, Clone)]
pub struct Dependant {
    pub(crate) name: Option<String>,
    pub(crate) key: Arc<str>,
    pub(crate) call: Option<Callable>,
    pub(crate) path_params: Vec<ParameterSpec>,
    pub(crate) query_params: Vec<ParameterSpec>,
    pub(crate) header_params: Vec<ParameterSpec>,
    pub(crate) body_params: Vec<ParameterSpec>,
    pub(crate) context_params: Vec<String>,
    pub(crate) dependencies: Vec<Dependant>,
    pub(crate) cache_key: CacheKey,
    pub(crate) use_cache: bool,
    pub(crate) security_scopes: Arc<[String]>,
}

impl Dependant {
    fn empty(
        key: Arc<str>,
        name: Option<String>,
        id: DependencyId,
        call: Option<Callable>,
        use_cache: bool,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            name,
            key,
            call,
            path_params: Vec::new(),
            query_params: Vec::new(),
            header_params: Vec::new(),
            body_params: Vec::new(),
            context_params: Vec::new(),
            dependencies: Vec::new(),
            cache_key: CacheKey::new(id, &scopes),
            use_cache,
            security_scopes: scopes.into(),
        }
    }

    /// Parameter name in the parent; `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Registry key, or the handler name for the root.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `None` for the root node.
    #[must_use]
    pub fn kind(&self) -> Option<DependencyKind> {
        self.call.as_ref().map(Callable::kind)
    }

    #[must_use]
    pub fn path_params(&self) -> &[ParameterSpec] {
        &self.path_params
    }

    #[must_use]
    pub fn query_params(&self) -> &[ParameterSpec] {
        &self.query_params
    }

    #[must_use]
    pub fn header_params(&self) -> &[ParameterSpec] {
        &self.header_params
    }

    #[must_use]
    pub fn body_params(&self) -> &[ParameterSpec] {
        &self.body_params
    }

    #[must_use]
    pub fn context_params(&self) -> &[String] {
        &self.context_params
    }

    #[must_use]
    pub fn dependencies(&self) -> &[Dependant] {
        &self.dependencies
    }

    #[must_use]
    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    #[must_use]
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    #[must_use]
    pub fn security_scopes(&self) -> &[String] {
        &self.security_scopes
    }

    /// Every value parameter of this node and its descendants, depth first.
    #[must_use]
    pub fn flat_params(&self) -> Vec<&ParameterSpec> {
        let mut out: Vec<&ParameterSpec> = self
            .dependencies
            .iter()
            .flat_map(Dependant::flat_params)
            .collect();
        out.extend(
            self.path_params
                .iter()
                .chain(&self.query_params)
                .chain(&self.header_params)
                .chain(&self.body_params),
        );
        out
    }

    /// Number of nodes in the tree, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self
            .dependencies
            .iter()
            .map(Dependant::node_count)
            .sum::<usize>()
    }

    /// Longest root-to-leaf path, counted in nodes.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self
            .dependencies
            .iter()
            .map(Dependant::depth)
            .max()
            .unwrap_or(0)
    }
}

/// Build the dependency graph for `handler` on `template`.
///
/// Sub-dependencies are looked up in `overrides` first, then in `registry`.
/// Nested dependencies see the same template, so they may read path
/// parameters too.
///
/// # Errors
///
/// - [`RegistrationError::CyclicDependency`] when a dependency is reached
///   again while it is still being built.
/// - [`RegistrationError::UnknownDependency`] for an unregistered key.
/// - [`RegistrationError::InvalidParameter`] from classification, duplicate
///   names, or constraints the validator cannot use.
pub fn build_dependant(
    template: &PathTemplate,
    handler: &Handler,
    registry: &DependencyRegistry,
    overrides: Option<&Overrides>,
    validator: &dyn ValueValidator,
) -> Result<Dependant, RegistrationError> {
    let mut builder = GraphBuilder {
        template,
        registry,
        overrides,
        validator,
        stack: Vec::new(),
    };
    builder.node(
        Arc::clone(handler.name()),
        None,
        handler.id(),
        handler.declared_params(),
        None,
        false,
        Vec::new(),
    )
}

struct GraphBuilder<'a> {
    template: &'a PathTemplate,
    registry: &'a DependencyRegistry,
    overrides: Option<&'a Overrides>,
    validator: &'a dyn ValueValidator,
    /// Dependencies currently being built, outermost first.
    stack: Vec<(DependencyId, Arc<str>)>,
}

impl GraphBuilder<'_> {
    #[allow(clippy::too_many_arguments)]
    fn node(
        &mut self,
        key: Arc<str>,
        name: Option<String>,
        id: DependencyId,
        params: &[Param],
        call: Option<Callable>,
        use_cache: bool,
        scopes: Vec<String>,
    ) -> Result<Dependant, RegistrationError> {
        if let Some(start) = self.stack.iter().position(|(sid, _)| *sid == id) {
            let path = self.stack[start..]
                .iter()
                .map(|(_, k)| k.as_ref())
                .chain(std::iter::once(key.as_ref()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(RegistrationError::CyclicDependency {
                key: key.to_string(),
                path,
            });
        }

        self.stack.push((id, Arc::clone(&key)));
        let result = self.populate(key, name, id, params, call, use_cache, scopes);
        self.stack.pop();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn populate(
        &mut self,
        key: Arc<str>,
        name: Option<String>,
        id: DependencyId,
        params: &[Param],
        call: Option<Callable>,
        use_cache: bool,
        scopes: Vec<String>,
    ) -> Result<Dependant, RegistrationError> {
        let mut node = Dependant::empty(Arc::clone(&key), name, id, call, use_cache, scopes);
        let mut seen: HashSet<&str> = HashSet::with_capacity(params.len());

        for param in params {
            if !seen.insert(param.name()) {
                return Err(RegistrationError::InvalidParameter {
                    owner: key.to_string(),
                    name: param.name().to_owned(),
                    reason: "declared more than once".to_owned(),
                });
            }

            match classify(&key, param, self.template)? {
                Classified::Param(spec) => {
                    self.validator
                        .prepare(&spec)
                        .map_err(|reason| RegistrationError::InvalidParameter {
                            owner: key.to_string(),
                            name: spec.name.clone(),
                            reason,
                        })?;
                    match spec.location {
                        Location::Path => node.path_params.push(spec),
                        Location::Query => node.query_params.push(spec),
                        Location::Header => node.header_params.push(spec),
                        Location::Body => node.body_params.push(spec),
                    }
                }
                Classified::Context { name } => node.context_params.push(name),
                Classified::SubDependency { name, marker } => {
                    let dep = self
                        .overrides
                        .and_then(|o| o.get(&marker.key))
                        .or_else(|| self.registry.get(&marker.key))
                        .ok_or_else(|| RegistrationError::UnknownDependency {
                            key: marker.key.to_string(),
                            required_by: key.to_string(),
                        })?
                        .clone();

                    let mut child_scopes = node.security_scopes.to_vec();
                    child_scopes.extend(marker.scopes.iter().cloned());

                    let child = self.node(
                        Arc::clone(&marker.key),
                        Some(name),
                        dep.id(),
                        dep.declared_params(),
                        Some(dep.callable().clone()),
                        marker.use_cache,
                        child_scopes,
                    )?;
                    debug!(
                        parent = %key,
                        dependency = %child.key,
                        cache_key = %child.cache_key,
                        use_cache = child.use_cache,
                        kind = ?child.kind(),
                        "Dependency node built"
                    );
                    node.dependencies.push(child);
                }
            }
        }

        Ok(node)
    }
}
