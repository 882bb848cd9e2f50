use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Declared type of a parameter.
///
/// Scalars drive string coercion for path/query/header values; `Object`
/// carries a JSON Schema used verbatim by the validation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<ParamType>),
    Object(Value),
    Any,
    /// The canonical request object, injected without extraction.
    Context,
}

impl ParamType {
    #[must_use]
    pub fn array(item: ParamType) -> Self {
        Self::Array(Box::new(item))
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    #[must_use]
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context)
    }

    /// JSON Schema fragment describing this type.
    #[must_use]
    pub fn schema(&self) -> Value {
        match self {
            Self::String => serde_json::json!({ "type": "string" }),
            Self::Integer => serde_json::json!({ "type": "integer" }),
            Self::Number => serde_json::json!({ "type": "number" }),
            Self::Boolean => serde_json::json!({ "type": "boolean" }),
            Self::Array(item) => serde_json::json!({ "type": "array", "items": item.schema() }),
            Self::Object(schema) => schema.clone(),
            Self::Any | Self::Context => Value::Object(Map::new()),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Integer => f.write_str("integer"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Array(item) => write!(f, "array<{item}>"),
            Self::Object(_) => f.write_str("object"),
            Self::Any => f.write_str("any"),
            Self::Context => f.write_str("context"),
        }
    }
}

/// Where an extracted value is read from. Also the `location` of a
/// validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Path,
    Query,
    Header,
    Body,
}

impl Location {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source kind assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Path,
    Query,
    Header,
    Body,
    Dependency,
    Context,
}

impl From<Location> for ParamSource {
    fn from(location: Location) -> Self {
        match location {
            Location::Path => Self::Path,
            Location::Query => Self::Query,
            Location::Header => Self::Header,
            Location::Body => Self::Body,
        }
    }
}

/// Sub-dependency declaration carried by a [`Marker::Depends`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependsMarker {
    /// Registry key of the dependency.
    pub key: Arc<str>,
    /// Reuse a result already computed for the same cache key in this request.
    pub use_cache: bool,
    /// Security scopes required by this use site.
    pub scopes: Vec<String>,
}

/// Explicit source annotation on a declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Path,
    Query,
    Header { convert_underscores: bool },
    Body { embed: bool },
    Depends(DependsMarker),
}

impl Marker {
    fn label(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header { .. } => "header",
            Self::Body { .. } => "body",
            Self::Depends(_) => "depends",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One declared handler or dependency parameter.
///
/// This is the explicit replacement for signature introspection: handlers
/// and dependencies list their parameters once at registration.
///
/// ```rust
/// use brrtfn::params::{Param, ParamType};
///
/// let limit = Param::integer("limit").query().default(10).minimum(1).maximum(100);
/// let agent = Param::string("user_agent").header();
/// let tags = Param::array("tag", ParamType::String).optional();
/// let db = Param::depends("db", "database");
/// # let _ = (limit, agent, tags, db);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub(crate) name: String,
    pub(crate) ty: ParamType,
    pub(crate) marker: Option<Marker>,
    pub(crate) default: Option<Value>,
    pub(crate) required: Option<bool>,
    pub(crate) alias: Option<String>,
    pub(crate) constraints: Map<String, Value>,
}

impl Param {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            marker: None,
            default: None,
            required: None,
            alias: None,
            constraints: Map::new(),
        }
    }

    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer)
    }

    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean)
    }

    #[must_use]
    pub fn array(name: impl Into<String>, item: ParamType) -> Self {
        Self::new(name, ParamType::array(item))
    }

    /// A structured parameter validated against `schema`. Declared without
    /// a marker it is read from the request body; use [`Param::query`] to
    /// parse it from a JSON-encoded query value instead.
    #[must_use]
    pub fn object(name: impl Into<String>, schema: Value) -> Self {
        Self::new(name, ParamType::Object(schema))
    }

    #[must_use]
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Any)
    }

    /// Inject the canonical request object under `name`.
    #[must_use]
    pub fn context(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Context)
    }

    /// Declare a cached sub-dependency on the registry entry `key`.
    #[must_use]
    pub fn depends(name: impl Into<String>, key: impl Into<Arc<str>>) -> Self {
        let mut p = Self::new(name, ParamType::Any);
        p.marker = Some(Marker::Depends(DependsMarker {
            key: key.into(),
            use_cache: true,
            scopes: Vec::new(),
        }));
        p
    }

    /// Like [`Param::depends`] but with required security scopes.
    #[must_use]
    pub fn security<I, S>(name: impl Into<String>, key: impl Into<Arc<str>>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::depends(name, key).scopes(scopes)
    }

    #[must_use]
    pub fn path(mut self) -> Self {
        self.marker = Some(Marker::Path);
        self
    }

    #[must_use]
    pub fn query(mut self) -> Self {
        self.marker = Some(Marker::Query);
        self
    }

    #[must_use]
    pub fn header(mut self) -> Self {
        self.marker = Some(Marker::Header {
            convert_underscores: true,
        });
        self
    }

    /// Keep underscores in the header lookup name.
    #[must_use]
    pub fn no_convert_underscores(mut self) -> Self {
        self.marker = Some(Marker::Header {
            convert_underscores: false,
        });
        self
    }

    #[must_use]
    pub fn body(mut self) -> Self {
        self.marker = Some(Marker::Body { embed: false });
        self
    }

    /// Read this body parameter from `body[alias]` even when it is the only
    /// body parameter.
    #[must_use]
    pub fn embed(mut self) -> Self {
        self.marker = Some(Marker::Body { embed: true });
        self
    }

    /// Re-run the dependency for every use site instead of sharing the
    /// per-request cached result. No effect on non-dependency parameters.
    #[must_use]
    pub fn no_cache(mut self) -> Self {
        if let Some(Marker::Depends(d)) = &mut self.marker {
            d.use_cache = false;
        }
        self
    }

    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(Marker::Depends(d)) = &mut self.marker {
            d.scopes.extend(scopes.into_iter().map(Into::into));
        }
        self
    }

    /// Default applied when the value is absent. Makes the parameter
    /// optional; combining it with [`Param::required`] is a registration
    /// error.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Absent values resolve to `null`.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    /// External name used for lookup (query key, header name, body field).
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Attach an opaque JSON Schema keyword passed through to the validator.
    #[must_use]
    pub fn constraint(mut self, keyword: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(keyword.into(), value.into());
        self
    }

    #[must_use]
    pub fn minimum(self, value: impl Into<Value>) -> Self {
        self.constraint("minimum", value)
    }

    #[must_use]
    pub fn maximum(self, value: impl Into<Value>) -> Self {
        self.constraint("maximum", value)
    }

    #[must_use]
    pub fn min_length(self, value: u64) -> Self {
        self.constraint("minLength", value)
    }

    #[must_use]
    pub fn max_length(self, value: u64) -> Self {
        self.constraint("maxLength", value)
    }

    #[must_use]
    pub fn pattern(self, regex: impl Into<String>) -> Self {
        self.constraint("pattern", regex.into())
    }

    #[must_use]
    pub fn one_of<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.constraint("enum", Value::Array(values))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &ParamType {
        &self.ty
    }

    #[must_use]
    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }
}

/// A classified value parameter, ready for extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Name under which the value is handed to the callable.
    pub name: String,
    /// Lookup key in the request (lower-cased for headers).
    pub alias: String,
    pub ty: ParamType,
    pub location: Location,
    pub required: bool,
    pub default: Option<Value>,
    pub constraints: Map<String, Value>,
    /// Body parameters only: read from `body[alias]` even when alone.
    pub embed: bool,
}

impl ParameterSpec {
    #[must_use]
    pub fn source(&self) -> ParamSource {
        self.location.into()
    }

    /// Type schema merged with the declared constraints.
    #[must_use]
    pub fn schema(&self) -> Value {
        let mut schema = self.ty.schema();
        if let Value::Object(map) = &mut schema {
            for (k, v) in &self.constraints {
                map.insert(k.clone(), v.clone());
            }
        }
        schema
    }

    /// True when the validator needs more than a type check.
    #[must_use]
    pub fn needs_schema(&self) -> bool {
        !self.constraints.is_empty() || matches!(self.ty, ParamType::Object(_))
    }
}

/// Result of classifying one [`Param`].
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Param(ParameterSpec),
    SubDependency { name: String, marker: DependsMarker },
    Context { name: String },
}
