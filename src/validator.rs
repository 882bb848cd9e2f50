//! # Validator Module
//!
//! The leaf-level validation collaborator. The resolver hands every extracted
//! raw value to a [`ValueValidator`] together with its [`ParameterSpec`] and
//! gets back either the typed value or one or more [`FieldError`]s.
//!
//! [`SchemaValidator`] is the default implementation:
//!
//! 1. **Coercion**: strings from the path, query string and headers are
//!    parsed into the declared scalar type (`"42"` → `42` for `integer`,
//!    `"true"`/`"1"`/`"on"` → `true` for `boolean`). Failures are
//!    `type_error`s.
//! 2. **Constraints**: when the parameter declares constraints or an object
//!    schema, the coerced value is checked against the merged JSON Schema,
//!    compiled once at registration through the [`ValidatorCache`]. Each
//!    violation becomes its own `constraint_violation`.

use crate::params::{Location, ParamType, ParameterSpec};
use crate::response::ResponseShape;
use crate::validator_cache::ValidatorCache;
use jsonschema::error::ValidationErrorKind;
use jsonschema::paths::Location as InstancePath;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Validation error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Missing,
    TypeError,
    ConstraintViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "missing",
            Self::TypeError => "type_error",
            Self::ConstraintViolation => "constraint_violation",
        })
    }
}

/// One offending field. Rendered verbatim in validation failure bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub location: Location,
    pub field: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(
        location: Location,
        field: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            location,
            field: field.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn missing(location: Location, field: impl Into<String>) -> Self {
        Self::new(location, field, ErrorKind::Missing, "Field required")
    }

    pub fn type_error(location: Location, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(location, field, ErrorKind::TypeError, message)
    }

    pub fn constraint(location: Location, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(location, field, ErrorKind::ConstraintViolation, message)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}.{}: {}", self.kind, self.location, self.field, self.message)
    }
}

/// A raw value as found in the request, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// A single header or query value.
    Text(String),
    /// Every value of a repeated query key, in order.
    List(Vec<String>),
    /// Already structured: converted path values and body fields.
    Json(Value),
}

/// Seam between the resolver and the type-directed validation library.
pub trait ValueValidator: Send + Sync {
    /// Registration-time hook, called once per classified parameter.
    ///
    /// # Errors
    ///
    /// A message describing why the parameter's constraints are unusable.
    fn prepare(&self, _spec: &ParameterSpec) -> Result<(), String> {
        Ok(())
    }

    /// Coerce and check one raw value.
    ///
    /// # Errors
    ///
    /// Every violation found for this value.
    fn validate(&self, raw: RawValue, spec: &ParameterSpec) -> Result<Value, Vec<FieldError>>;

    /// Compile a route's response shape at registration.
    ///
    /// # Errors
    ///
    /// The compiler's message when `schema` is not a valid JSON Schema.
    fn response_shape(&self, schema: Value) -> Result<ResponseShape, String> {
        ResponseShape::new(schema)
    }
}

/// Default validator: string coercion plus JSON Schema constraints.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    cache: ValidatorCache,
}

impl SchemaValidator {
    #[must_use]
    pub fn new(cache: ValidatorCache) -> Self {
        Self { cache }
    }

    #[must_use]
    pub fn cache(&self) -> &ValidatorCache {
        &self.cache
    }

    fn check_constraints(&self, value: &Value, spec: &ParameterSpec) -> Vec<FieldError> {
        if !spec.needs_schema() {
            return Vec::new();
        }
        let schema = spec.schema();
        let validator = match self.cache.get_or_compile(&schema) {
            Ok(v) => v,
            Err(message) => {
                return vec![FieldError::constraint(
                    spec.location,
                    &spec.alias,
                    format!("unusable constraints: {message}"),
                )]
            }
        };
        validator
            .iter_errors(value)
            .map(|e| {
                let field = nested_field(&spec.alias, e.instance_path());
                match e.kind() {
                    ValidationErrorKind::Required { property } => FieldError::missing(
                        spec.location,
                        format!("{field}.{}", property.as_str().unwrap_or_default()),
                    ),
                    _ => FieldError::constraint(spec.location, field, e.to_string()),
                }
            })
            .collect()
    }
}

impl ValueValidator for SchemaValidator {
    fn prepare(&self, spec: &ParameterSpec) -> Result<(), String> {
        if spec.needs_schema() {
            self.cache.precompile(&spec.schema())?;
        }
        Ok(())
    }

    fn response_shape(&self, schema: Value) -> Result<ResponseShape, String> {
        let validator = self.cache.get_or_compile(&schema)?;
        Ok(ResponseShape::from_compiled(schema, validator))
    }

    fn validate(&self, raw: RawValue, spec: &ParameterSpec) -> Result<Value, Vec<FieldError>> {
        let coerced = match raw {
            RawValue::Text(text) => coerce_text(&text, &spec.ty).map_err(|m| vec![m]),
            RawValue::List(items) => coerce_list(items, &spec.ty),
            RawValue::Json(value) => coerce_json(value, &spec.ty).map_err(|m| vec![m]),
        };
        let value = coerced.map_err(|messages| {
            messages
                .into_iter()
                .map(|m| FieldError::type_error(spec.location, &spec.alias, m))
                .collect::<Vec<_>>()
        })?;

        let errors = self.check_constraints(&value, spec);
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(errors)
        }
    }
}

/// `alias` followed by the dotted instance path, e.g. `item.tags.0`.
fn nested_field(alias: &str, path: &InstancePath) -> String {
    path.iter().fold(alias.to_owned(), |mut field, segment| {
        field.push('.');
        field.push_str(&segment.to_string());
        field
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Some(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Some(false),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

fn coerce_text(text: &str, ty: &ParamType) -> Result<Value, String> {
    match ty {
        ParamType::String | ParamType::Any | ParamType::Context => Ok(Value::String(text.to_owned())),
        ParamType::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("Input should be a valid integer, got '{text}'")),
        ParamType::Number => parse_number(text)
            .map(Value::Number)
            .ok_or_else(|| format!("Input should be a valid number, got '{text}'")),
        ParamType::Boolean => parse_bool(text)
            .map(Value::Bool)
            .ok_or_else(|| format!("Input should be a valid boolean, got '{text}'")),
        ParamType::Array(item) => Ok(Value::Array(vec![coerce_text(text, item)?])),
        ParamType::Object(_) => serde_json::from_str::<Value>(text)
            .map_err(|e| format!("Input should be valid JSON: {e}")),
    }
}

fn coerce_list(items: Vec<String>, ty: &ParamType) -> Result<Value, Vec<String>> {
    match ty {
        ParamType::Array(item) => {
            let mut values = Vec::with_capacity(items.len());
            let mut errors = Vec::new();
            for (idx, text) in items.iter().enumerate() {
                match coerce_text(text, item) {
                    Ok(v) => values.push(v),
                    Err(m) => errors.push(format!("item {idx}: {m}")),
                }
            }
            if errors.is_empty() {
                Ok(Value::Array(values))
            } else {
                Err(errors)
            }
        }
        // Scalars take the last occurrence of a repeated key.
        scalar => match items.last() {
            Some(text) => coerce_text(text, scalar).map_err(|m| vec![m]),
            None => Err(vec!["Input should not be empty".to_owned()]),
        },
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_json(value: Value, ty: &ParamType) -> Result<Value, String> {
    match (ty, value) {
        (ParamType::Any | ParamType::Context, v) => Ok(v),
        (ParamType::String, v @ Value::String(_)) => Ok(v),
        (ParamType::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Ok(Value::Number(n))
            } else {
                match n.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::from(f as i64)),
                    _ => Err(format!("Input should be a valid integer, got {n}")),
                }
            }
        }
        (ParamType::Number, v @ Value::Number(_)) => Ok(v),
        (ParamType::Boolean, v @ Value::Bool(_)) => Ok(v),
        (ParamType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("Input should be a valid boolean, got {n}")),
        },
        (scalar @ (ParamType::Integer | ParamType::Number | ParamType::Boolean), Value::String(s)) => {
            coerce_text(&s, scalar)
        }
        (ParamType::Array(item), Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, v) in items.into_iter().enumerate() {
                out.push(coerce_json(v, item).map_err(|m| format!("item {idx}: {m}"))?);
            }
            Ok(Value::Array(out))
        }
        (ParamType::Object(schema), v) => {
            let expected = schema.get("type").and_then(Value::as_str);
            match expected {
                Some("object") if !v.is_object() => Err(format!(
                    "Input should be a valid object, got {}",
                    json_type_name(&v)
                )),
                Some("array") if !v.is_array() => Err(format!(
                    "Input should be a valid array, got {}",
                    json_type_name(&v)
                )),
                _ => Ok(v),
            }
        }
        (expected, v) => Err(format!(
            "Input should be a valid {expected}, got {}",
            json_type_name(&v)
        )),
    }
}
