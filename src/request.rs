//! Canonical request consumed by the engine.
//!
//! Transport adapters normalise whatever envelope they receive into a
//! [`Request`]: method, decoded path, headers (case-insensitive), query
//! parameters (multi-valued) and an optional raw body whose JSON form is
//! parsed lazily, at most once.

use crate::ids::{RequestId, REQUEST_ID_HEADER};
use http::Method;
use once_cell::sync::OnceCell;
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

/// Maximum number of headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage with lower-cased `Arc<str>` names.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Ordered, multi-valued query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse an `application/x-www-form-urlencoded` query string (without `?`).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let pairs = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Last value for `name` ("last write wins").
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A normalised inbound request.
///
/// ```rust
/// use brrtfn::request::Request;
/// use http::Method;
///
/// let req = Request::new(Method::GET, "/items?tag=a&tag=b")
///     .with_header("User-Agent", "curl/8");
/// assert_eq!(req.path(), "/items");
/// assert_eq!(req.query().get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
/// assert_eq!(req.header("user-agent"), Some("curl/8"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderVec,
    query: QueryParams,
    body: Option<Vec<u8>>,
    json: OnceCell<Option<Value>>,
    request_id: RequestId,
}

impl Request {
    /// Build a request from a method and a target (`/path?query`).
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, raw)) => (path, QueryParams::parse(raw)),
            None => (target, QueryParams::default()),
        };
        Self {
            method,
            path: path.to_owned(),
            headers: HeaderVec::new(),
            query,
            body: None,
            json: OnceCell::new(),
            request_id: RequestId::new(),
        }
    }

    #[must_use]
    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    #[must_use]
    pub fn post(target: &str) -> Self {
        Self::new(Method::POST, target)
    }

    /// Append a header. Names are stored lower-cased; a parseable
    /// `x-request-id` becomes the request's id.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == REQUEST_ID_HEADER {
            if let Ok(id) = value.trim().parse::<RequestId>() {
                self.request_id = id;
            }
        }
        self.headers.push((Arc::from(name), value));
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push(name, value);
        self
    }

    /// Set the raw body. Its JSON form is parsed on first access.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self.json = OnceCell::new();
        self
    }

    /// Set a JSON body and a matching `content-type`.
    #[must_use]
    pub fn with_json(self, value: &Value) -> Self {
        let has_content_type = self.header("content-type").is_some();
        let req = self.with_body(value.to_string());
        if has_content_type {
            req
        } else {
            req.with_header("content-type", "application/json")
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Last value of header `name`, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of header `name`, case-insensitive, in order.
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Parsed JSON body. `None` when there is no body, it is empty, or it is
    /// not valid JSON.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| {
                let bytes = self.body.as_deref().filter(|b| !b.is_empty())?;
                match serde_json::from_slice::<Value>(bytes) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        debug!(
                            request_id = %self.request_id,
                            error = %err,
                            body_len = bytes.len(),
                            "Request body is not valid JSON, treating as absent"
                        );
                        None
                    }
                }
            })
            .as_ref()
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}
