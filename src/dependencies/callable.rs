use super::values::Values;
use crate::params::Param;
use crate::response::HandlerResponse;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Type-erased value produced by a dependency.
pub type Produced = Arc<dyn Any + Send + Sync>;

/// Cleanup half of a scoped resource. Runs at most once, when the request's
/// resolution context closes.
pub type Finalizer = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub(crate) type PlainFn =
    Arc<dyn Fn(Values) -> BoxFuture<'static, anyhow::Result<Produced>> + Send + Sync>;
pub(crate) type ScopedFn =
    Arc<dyn Fn(Values) -> BoxFuture<'static, anyhow::Result<(Produced, Finalizer)>> + Send + Sync>;
pub(crate) type HandlerFn =
    Arc<dyn Fn(Values) -> BoxFuture<'static, anyhow::Result<HandlerResponse>> + Send + Sync>;

static NEXT_DEPENDENCY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Dependency`]. Clones share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyId(u64);

impl DependencyId {
    fn next() -> Self {
        Self(NEXT_DEPENDENCY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

/// Kind of a dependency callable, fixed when the dependency is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Plain,
    ScopedResource,
}

/// The closed set of dependency callables.
#[derive(Clone)]
pub enum Callable {
    Plain(PlainFn),
    Scoped(ScopedFn),
}

impl Callable {
    #[must_use]
    pub fn kind(&self) -> DependencyKind {
        match self {
            Self::Plain(_) => DependencyKind::Plain,
            Self::Scoped(_) => DependencyKind::ScopedResource,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable::{:?}", self.kind())
    }
}

/// A value paired with the cleanup that must run once the request is done.
///
/// ```rust
/// use brrtfn::dependencies::Scoped;
///
/// let session = Scoped::new(String::from("conn-1"), || async {
///     // release the connection
///     Ok::<_, anyhow::Error>(())
/// });
/// # let _ = session;
/// ```
pub struct Scoped<T> {
    value: T,
    finalizer: Finalizer,
}

impl<T> Scoped<T> {
    pub fn new<F, Fut>(value: T, cleanup: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            value,
            finalizer: Box::new(move || cleanup().boxed()),
        }
    }

    /// Synchronous cleanup, run inline when the context closes.
    pub fn with_sync_cleanup<F>(value: T, cleanup: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            value,
            finalizer: Box::new(move || future::ready(cleanup()).boxed()),
        }
    }

    pub fn into_parts(self) -> (T, Finalizer) {
        (self.value, self.finalizer)
    }
}

/// A named, declared dependency.
///
/// Declare every parameter before registering the dependency; the graph is
/// built from the declaration at route registration.
#[derive(Clone)]
pub struct Dependency {
    id: DependencyId,
    name: Arc<str>,
    params: Vec<Param>,
    call: Callable,
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.call.kind())
            .field("params", &self.params.len())
            .finish()
    }
}

impl Dependency {
    fn from_callable(name: impl Into<Arc<str>>, call: Callable) -> Self {
        Self {
            id: DependencyId::next(),
            name: name.into(),
            params: Vec::new(),
            call,
        }
    }

    /// An async dependency returning a plain value.
    pub fn plain<F, Fut, T>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Any + Send + Sync,
    {
        let call: PlainFn = Arc::new(move |values: Values| {
            let fut = f(values);
            async move { fut.await.map(|v| Arc::new(v) as Produced) }.boxed()
        });
        Self::from_callable(name, Callable::Plain(call))
    }

    /// A synchronous dependency, run inline on the resolving task.
    pub fn plain_sync<F, T>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> anyhow::Result<T> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        let call: PlainFn =
            Arc::new(move |values: Values| future::ready(f(values).map(|v| Arc::new(v) as Produced)).boxed());
        Self::from_callable(name, Callable::Plain(call))
    }

    /// An async scoped-resource producer.
    pub fn scoped<F, Fut, T>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Scoped<T>>> + Send + 'static,
        T: Any + Send + Sync,
    {
        let call: ScopedFn = Arc::new(move |values: Values| {
            let fut = f(values);
            async move {
                let (value, finalizer) = fut.await?.into_parts();
                Ok::<_, anyhow::Error>((Arc::new(value) as Produced, finalizer))
            }
            .boxed()
        });
        Self::from_callable(name, Callable::Scoped(call))
    }

    /// A synchronous scoped-resource producer.
    pub fn scoped_sync<F, T>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> anyhow::Result<Scoped<T>> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        let call: ScopedFn = Arc::new(move |values: Values| {
            let produced = f(values).map(|scoped| {
                let (value, finalizer) = scoped.into_parts();
                (Arc::new(value) as Produced, finalizer)
            });
            future::ready(produced).boxed()
        });
        Self::from_callable(name, Callable::Scoped(call))
    }

    /// A constant provider. Mostly useful as an override in tests.
    pub fn value<T>(name: impl Into<Arc<str>>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        let shared: Produced = Arc::new(value);
        let call: PlainFn = Arc::new(move |_: Values| {
            future::ready(Ok::<_, anyhow::Error>(Arc::clone(&shared))).boxed()
        });
        Self::from_callable(name, Callable::Plain(call))
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn params<I: IntoIterator<Item = Param>>(mut self, params: I) -> Self {
        self.params.extend(params);
        self
    }

    #[must_use]
    pub fn id(&self) -> DependencyId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn declared_params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn kind(&self) -> DependencyKind {
        self.call.kind()
    }

    pub(crate) fn callable(&self) -> &Callable {
        &self.call
    }
}

/// A named route handler producing a JSON-serializable result.
#[derive(Clone)]
pub struct Handler {
    id: DependencyId,
    name: Arc<str>,
    params: Vec<Param>,
    call: HandlerFn,
    custom_response: bool,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish()
    }
}

impl Handler {
    /// Async handler whose result is serialized into a `200` response.
    pub fn new<F, Fut, R>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize,
    {
        Self::from_call(
            name,
            Arc::new(move |values: Values| {
                let fut = f(values);
                async move { Ok(HandlerResponse::ok(serde_json::to_value(fut.await?)?)) }.boxed()
            }),
        )
    }

    pub fn sync<F, R>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Serialize,
    {
        Self::from_call(
            name,
            Arc::new(move |values: Values| {
                let out = f(values)
                    .and_then(|r| serde_json::to_value(r).map_err(anyhow::Error::from))
                    .map(HandlerResponse::ok);
                future::ready(out).boxed()
            }),
        )
    }

    /// Async handler choosing its own status and headers.
    ///
    /// ```rust
    /// use brrtfn::{Handler, HandlerResponse};
    ///
    /// let moved = Handler::responding("moved", |_| async {
    ///     Ok::<_, anyhow::Error>(HandlerResponse::redirect(308, "/v2/items"))
    /// });
    /// assert_eq!(&**moved.name(), "moved");
    /// ```
    pub fn responding<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerResponse>> + Send + 'static,
    {
        Self::from_call(name, Arc::new(move |values: Values| f(values).boxed())).custom()
    }

    pub fn responding_sync<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Values) -> anyhow::Result<HandlerResponse> + Send + Sync + 'static,
    {
        Self::from_call(name, Arc::new(move |values: Values| future::ready(f(values)).boxed()))
            .custom()
    }

    fn from_call(name: impl Into<Arc<str>>, call: HandlerFn) -> Self {
        Self {
            id: DependencyId::next(),
            name: name.into(),
            params: Vec::new(),
            call,
            custom_response: false,
        }
    }

    fn custom(mut self) -> Self {
        self.custom_response = true;
        self
    }

    /// Whether the handler builds its own [`HandlerResponse`]. A route's
    /// response shape is not applied to those.
    #[must_use]
    pub fn has_custom_response(&self) -> bool {
        self.custom_response
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn params<I: IntoIterator<Item = Param>>(mut self, params: I) -> Self {
        self.params.extend(params);
        self
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> DependencyId {
        self.id
    }

    #[must_use]
    pub fn declared_params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn call(&self, values: Values) -> BoxFuture<'static, anyhow::Result<HandlerResponse>> {
        (self.call)(values)
    }
}
