use super::callable::Produced;
use crate::request::Request;
use anyhow::{anyhow, Context as _};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolved inputs handed to a dependency or handler.
///
/// Holds the node's own extracted parameters as JSON, the results of its
/// sub-dependencies keyed by parameter name, and the request object.
#[derive(Clone)]
pub struct Values {
    request: Arc<Request>,
    params: HashMap<String, Value>,
    resolved: HashMap<String, Produced>,
    contexts: Vec<String>,
    scopes: Arc<[String]>,
}

impl std::fmt::Debug for Values {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut deps: Vec<&str> = self.resolved.keys().map(String::as_str).collect();
        deps.sort_unstable();
        f.debug_struct("Values")
            .field("params", &self.params)
            .field("dependencies", &deps)
            .field("contexts", &self.contexts)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Values {
    pub(crate) fn new(request: Arc<Request>, scopes: Arc<[String]>) -> Self {
        Self {
            request,
            params: HashMap::new(),
            resolved: HashMap::new(),
            contexts: Vec::new(),
            scopes,
        }
    }

    pub(crate) fn insert_param(&mut self, name: &str, value: Value) {
        self.params.insert(name.to_owned(), value);
    }

    pub(crate) fn insert_resolved(&mut self, name: &str, value: Produced) {
        self.resolved.insert(name.to_owned(), value);
    }

    pub(crate) fn insert_context(&mut self, name: &str) {
        self.contexts.push(name.to_owned());
    }

    /// The request being handled. Always available, declared or not.
    #[must_use]
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// The request object if `name` was declared as a context parameter.
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&Arc<Request>> {
        self.contexts
            .iter()
            .any(|c| c == name)
            .then_some(&self.request)
    }

    /// Raw JSON of an extracted parameter.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Deserialize an extracted parameter.
    ///
    /// # Errors
    ///
    /// The parameter was not declared on this node, or its value does not
    /// deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .params
            .get(name)
            .ok_or_else(|| anyhow!("parameter '{name}' was not declared"))?;
        T::deserialize(value).with_context(|| format!("parameter '{name}' has an unexpected shape"))
    }

    /// Result of the sub-dependency declared as `name`.
    ///
    /// # Errors
    ///
    /// No sub-dependency named `name`, or it produced a different type.
    pub fn dep<T: Any + Send + Sync>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        let produced = self
            .resolved
            .get(name)
            .ok_or_else(|| anyhow!("dependency '{name}' was not declared"))?;
        Arc::clone(produced).downcast::<T>().map_err(|_| {
            anyhow!(
                "dependency '{name}' did not produce a {}",
                std::any::type_name::<T>()
            )
        })
    }

    #[must_use]
    pub fn try_dep<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.resolved
            .get(name)
            .and_then(|p| Arc::clone(p).downcast::<T>().ok())
    }

    /// Security scopes accumulated along the path to this node, in
    /// declaration order.
    #[must_use]
    pub fn security_scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name) || self.resolved.contains_key(name)
    }

    /// Extracted parameters as a JSON object.
    #[must_use]
    pub fn params_json(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
