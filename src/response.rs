//! Dispatch outcomes, HTTP errors raised by user code, response rendering
//! and response-shape filtering.

use crate::errors::ResolutionFailure;
use crate::request::HeaderVec;
use crate::validator::FieldError;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An error carrying a client-visible status, returned from a handler or
/// dependency to short-circuit the request.
///
/// ```rust
/// use brrtfn::response::HttpError;
///
/// fn check(token: Option<&str>) -> anyhow::Result<()> {
///     token.ok_or_else(|| HttpError::forbidden("Not authenticated"))?;
///     Ok(())
/// }
/// assert!(check(None).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("HTTP {status}: {detail}")]
pub struct HttpError {
    pub status: u16,
    pub detail: Value,
    pub headers: HeaderVec,
}

impl HttpError {
    pub fn new(status: u16, detail: impl Into<Value>) -> Self {
        Self {
            status,
            detail: detail.into(),
            headers: HeaderVec::new(),
        }
    }

    pub fn bad_request(detail: impl Into<Value>) -> Self {
        Self::new(400, detail)
    }

    pub fn unauthorized(detail: impl Into<Value>) -> Self {
        Self::new(401, detail)
    }

    pub fn forbidden(detail: impl Into<Value>) -> Self {
        Self::new(403, detail)
    }

    pub fn not_found(detail: impl Into<Value>) -> Self {
        Self::new(404, detail)
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name.to_ascii_lowercase()), value.into()));
        self
    }
}

/// A handler result with its own status and headers.
///
/// Plain serializable handler results become `200` with no extra headers.
///
/// ```rust
/// use brrtfn::response::HandlerResponse;
///
/// let moved = HandlerResponse::redirect(307, "/v2/items");
/// assert_eq!(moved.status, 307);
/// assert_eq!(moved.header("Location"), Some("/v2/items"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Value,
}

impl HandlerResponse {
    pub fn new(status: u16, body: impl Into<Value>) -> Self {
        Self {
            status,
            headers: HeaderVec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Value>) -> Self {
        Self::new(200, body)
    }

    /// Empty-bodied response pointing at `location`.
    #[must_use]
    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self::new(status, Value::Null).with_header("location", location)
    }

    /// Serialize `body` into a response with `status`.
    ///
    /// # Errors
    ///
    /// When `body` cannot be represented as JSON.
    pub fn json<T: Serialize>(status: u16, body: &T) -> serde_json::Result<Self> {
        Ok(Self::new(status, serde_json::to_value(body)?))
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name.to_ascii_lowercase()), value.into()));
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Result of dispatching one request.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The handler's result, body already shaped.
    Success(HandlerResponse),
    /// No route matched method and path.
    NotFound,
    /// Every validation error found in one pass. The handler did not run.
    ValidationFailed(Vec<FieldError>),
    /// User code rejected the request with a chosen status.
    HttpError(HttpError),
    /// A callable failed, panicked, timed out, or cleanup failed.
    ServerError(ResolutionFailure),
}

impl DispatchOutcome {
    pub(crate) fn from_failure(failure: ResolutionFailure) -> Self {
        match failure {
            ResolutionFailure::Rejected(http) => Self::HttpError(http),
            other => Self::ServerError(other),
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Success(reply) => reply.status,
            Self::NotFound => 404,
            Self::ValidationFailed(_) => 422,
            Self::HttpError(e) => e.status,
            Self::ServerError(_) => 500,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::HttpError(_) => "http_error",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Render as a JSON response. Failures use a `{"detail": ...}` body;
    /// server errors only expose their cause when `debug` is set.
    #[must_use]
    pub fn into_response(self, debug: bool) -> Response {
        let status = self.status();
        match self {
            Self::Success(reply) => {
                let mut response = Response::json(status, reply.body);
                for (name, value) in reply.headers {
                    response.set_header(&name, value);
                }
                response
            }
            Self::NotFound => Response::error(status, json!("Not Found")),
            Self::ValidationFailed(errors) => Response::error(
                status,
                serde_json::to_value(&errors).unwrap_or_else(|_| json!("Validation failed")),
            ),
            Self::HttpError(err) => {
                let mut response = Response::error(status, err.detail);
                for (name, value) in err.headers {
                    response.set_header(&name, value);
                }
                response
            }
            Self::ServerError(failure) if debug => {
                Response::error(status, Value::String(failure.to_string()))
            }
            Self::ServerError(_) => Response::error(status, json!("Internal Server Error")),
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => f.write_str("success"),
            Self::NotFound => f.write_str("not found"),
            Self::ValidationFailed(errors) => write!(f, "validation failed ({} errors)", errors.len()),
            Self::HttpError(e) => write!(f, "{e}"),
            Self::ServerError(e) => write!(f, "server error: {e}"),
        }
    }
}

/// Rendered response handed back to the transport adapter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Response {
    pub status: u16,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    pub body: Value,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with a `content-type` header.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_owned()));
        Self {
            status,
            headers,
            body,
        }
    }

    /// `{"detail": detail}` error body.
    #[must_use]
    pub fn error(status: u16, detail: Value) -> Self {
        Self::json(status, json!({ "detail": detail }))
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }
}

/// Declared shape of a route's successful result.
///
/// Objects are filtered down to the schema's `properties` (recursively,
/// through arrays via `items`) unless the schema allows
/// `additionalProperties`; the filtered value is then validated.
#[derive(Clone)]
pub struct ResponseShape {
    schema: Value,
    validator: Arc<Validator>,
}

impl fmt::Debug for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseShape").field("schema", &self.schema).finish()
    }
}

impl ResponseShape {
    /// # Errors
    ///
    /// The compiler's message when `schema` is not a valid JSON Schema.
    pub fn new(schema: Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| e.to_string())?;
        Ok(Self {
            schema,
            validator: Arc::new(validator),
        })
    }

    /// Pair `schema` with a validator already compiled from it.
    #[must_use]
    pub fn from_compiled(schema: Value, validator: Arc<Validator>) -> Self {
        Self { schema, validator }
    }

    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Filter `value` to the declared shape and validate it.
    ///
    /// # Errors
    ///
    /// Every violation, joined into one message.
    pub fn apply(&self, value: Value) -> Result<Value, String> {
        let shaped = filter(&self.schema, value);
        let violations: Vec<String> = self
            .validator
            .iter_errors(&shaped)
            .map(|e| e.to_string())
            .collect();
        if violations.is_empty() {
            Ok(shaped)
        } else {
            Err(violations.join("; "))
        }
    }
}

fn filter(schema: &Value, value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let Some(props) = schema.get("properties").and_then(Value::as_object) else {
                return Value::Object(fields);
            };
            let keep_extra = matches!(
                schema.get("additionalProperties"),
                Some(Value::Bool(true) | Value::Object(_))
            );
            let mut out = Map::with_capacity(fields.len());
            for (key, field) in fields {
                match props.get(&key) {
                    Some(sub) => {
                        out.insert(key, filter(sub, field));
                    }
                    None if keep_extra => {
                        out.insert(key, field);
                    }
                    None => {}
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => match schema.get("items") {
            Some(item_schema) => {
                Value::Array(items.into_iter().map(|v| filter(item_schema, v)).collect())
            }
            None => Value::Array(items),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Location;

    #[test]
    fn status_mapping() {
        assert_eq!(DispatchOutcome::Success(HandlerResponse::ok(1)).status(), 200);
        assert_eq!(
            DispatchOutcome::Success(HandlerResponse::redirect(303, "/a")).status(),
            303
        );
        assert_eq!(DispatchOutcome::NotFound.status(), 404);
        assert_eq!(DispatchOutcome::ValidationFailed(vec![]).status(), 422);
        assert_eq!(DispatchOutcome::HttpError(HttpError::forbidden("no")).status(), 403);
        assert_eq!(
            DispatchOutcome::ServerError(ResolutionFailure::Misuse("x".into())).status(),
            500
        );
    }

    #[test]
    fn validation_failure_body_lists_every_error() {
        let errors = vec![
            FieldError::missing(Location::Query, "q"),
            FieldError::constraint(Location::Body, "price", "-1 is less than the minimum of 0"),
        ];
        let response = DispatchOutcome::ValidationFailed(errors).into_response(false);
        assert_eq!(response.status, 422);
        let detail = response.body["detail"].as_array().unwrap();
        assert_eq!(detail.len(), 2);
        assert_eq!(detail[0]["location"], "query");
        assert_eq!(detail[0]["kind"], "missing");
        assert_eq!(detail[1]["kind"], "constraint_violation");
    }

    #[test]
    fn server_error_hides_cause_unless_debug() {
        let failure = ResolutionFailure::Handler {
            handler: "h".into(),
            message: "db down".into(),
        };
        let quiet = DispatchOutcome::ServerError(failure.clone()).into_response(false);
        assert_eq!(quiet.body, json!({"detail": "Internal Server Error"}));
        let loud = DispatchOutcome::ServerError(failure).into_response(true);
        assert!(loud.body["detail"].as_str().unwrap().contains("db down"));
    }

    #[test]
    fn http_error_keeps_headers() {
        let err = HttpError::unauthorized("Not authenticated").with_header("WWW-Authenticate", "Bearer");
        let response = DispatchOutcome::HttpError(err).into_response(false);
        assert_eq!(response.status, 401);
        assert_eq!(response.get_header("www-authenticate"), Some("Bearer"));
        assert_eq!(response.body, json!({"detail": "Not authenticated"}));
    }

    #[test]
    fn handler_status_and_headers_reach_the_response() {
        let reply = HandlerResponse::new(201, json!({"id": 7}))
            .with_header("Location", "/items/7")
            .with_header("content-type", "application/vnd.item+json");
        let response = DispatchOutcome::Success(reply).into_response(false);
        assert_eq!(response.status, 201);
        assert_eq!(response.get_header("location"), Some("/items/7"));
        assert_eq!(response.get_header("content-type"), Some("application/vnd.item+json"));
        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.body, json!({"id": 7}));
    }

    #[test]
    fn shape_filters_undeclared_fields_recursively() {
        let shape = ResponseShape::new(json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer"},
                "tags": {"type": "array", "items": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}}
                }}
            },
            "required": ["id"]
        }))
        .unwrap();
        let out = shape
            .apply(json!({
                "id": 1,
                "password": "secret",
                "tags": [{"name": "a", "internal": true}]
            }))
            .unwrap();
        assert_eq!(out, json!({"id": 1, "tags": [{"name": "a"}]}));

        assert!(shape.apply(json!({"tags": []})).is_err());
    }
}
