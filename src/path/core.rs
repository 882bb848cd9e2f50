//! Path template compiler - runs once per route at registration, matches on
//! every request.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Maximum number of path values before heap allocation.
/// Most routes have ≤4 placeholders (e.g., `/orgs/{org}/users/{id}`).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Converted path values of one successful match, in placeholder order.
///
/// Names are `Arc<str>` shared with the compiled template so a match only
/// allocates for the captured values.
pub type PathValues = SmallVec<[(Arc<str>, Value); MAX_INLINE_PARAMS]>;

#[allow(clippy::expect_used)]
static PARAM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("placeholder name regex"));

/// Typed parser applied to a single captured placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Converter {
    /// Any run of characters excluding `/`.
    String,
    /// Optionally signed digit run, converted to `i64`.
    Integer,
    /// Everything up to the end of the path, separators included.
    PathRemainder,
}

impl Converter {
    /// Resolve a converter from its template spelling.
    ///
    /// Both the long names (`string`, `integer`, `path-remainder`) and the
    /// short aliases (`str`, `int`, `path`) are accepted.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" | "str" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "path-remainder" | "path" => Some(Self::PathRemainder),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::PathRemainder => "path-remainder",
        }
    }

    /// Regex fragment used inside the named capture.
    #[must_use]
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::String => "[^/]+",
            Self::Integer => "-?[0-9]+",
            Self::PathRemainder => ".*",
        }
    }

    /// Convert a captured segment into its typed value.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when an integer capture overflows `i64` or
    /// is not a digit run.
    pub fn convert(&self, name: &str, raw: &str) -> Result<Value, ConversionError> {
        match self {
            Self::String | Self::PathRemainder => Ok(Value::String(raw.to_owned())),
            Self::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| ConversionError {
                    name: name.to_owned(),
                    value: raw.to_owned(),
                    converter: self.name(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Inverse of [`Converter::convert`], used when rendering a URL.
    ///
    /// Returns `None` if the value could never have been produced by this
    /// converter (wrong JSON type, or a `/` inside a `string` segment).
    #[must_use]
    pub fn format(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (Self::String, Value::String(s)) if !s.is_empty() && !s.contains('/') => {
                Some(s.clone())
            }
            (Self::Integer, Value::Number(n)) => n.as_i64().map(|i| i.to_string()),
            (Self::PathRemainder, Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raised at registration time when a template cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedTemplateError {
    #[error("unbalanced braces in path template '{template}' at byte {position}")]
    UnbalancedBraces { template: String, position: usize },
    #[error("unknown converter '{converter}' for parameter '{name}' in path template '{template}'")]
    UnknownConverter {
        template: String,
        name: String,
        converter: String,
    },
    #[error("invalid parameter name '{name}' in path template '{template}'")]
    InvalidName { template: String, name: String },
    #[error("duplicate parameter '{name}' in path template '{template}'")]
    DuplicateParameter { template: String, name: String },
    #[error("path-remainder parameter '{name}' must end path template '{template}'")]
    RemainderNotLast { template: String, name: String },
    #[error("path template '{template}' produced an invalid matcher: {reason}")]
    Matcher { template: String, reason: String },
}

/// A captured segment that matched the converter's pattern but could not be
/// converted. The router treats this as a non-match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert '{value}' for path parameter '{name}' with the {converter} converter: {reason}")]
pub struct ConversionError {
    pub name: String,
    pub value: String,
    pub converter: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(usize),
}

/// A compiled, fully anchored route template.
///
/// Matching is case-sensitive and performs no trailing-slash normalisation:
/// `/users` and `/users/` are different paths.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    matcher: Regex,
    params: Vec<(Arc<str>, Converter)>,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a route template such as `/users/{user_id:integer}/files/{rest:path}`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedTemplateError`] for unbalanced or nested braces,
    /// unknown converters, invalid or duplicate names, or a `path-remainder`
    /// placeholder that is not the final component.
    pub fn compile(template: &str) -> Result<Self, MalformedTemplateError> {
        let mut pattern = String::with_capacity(template.len() + 16);
        pattern.push('^');
        let mut params: Vec<(Arc<str>, Converter)> = Vec::new();
        let mut segments = Vec::new();
        let mut literal = String::new();

        let mut rest = template;
        let mut offset = 0usize;
        while !rest.is_empty() {
            let next = rest.find(['{', '}']);
            let Some(idx) = next else {
                literal.push_str(rest);
                break;
            };
            literal.push_str(&rest[..idx]);
            let position = offset + idx;
            if rest.as_bytes()[idx] == b'}' {
                return Err(MalformedTemplateError::UnbalancedBraces {
                    template: template.to_owned(),
                    position,
                });
            }

            let after_open = &rest[idx + 1..];
            let close = after_open.find(['{', '}']);
            let close = match close {
                Some(c) if after_open.as_bytes()[c] == b'}' => c,
                Some(c) => {
                    return Err(MalformedTemplateError::UnbalancedBraces {
                        template: template.to_owned(),
                        position: position + 1 + c,
                    })
                }
                None => {
                    return Err(MalformedTemplateError::UnbalancedBraces {
                        template: template.to_owned(),
                        position,
                    })
                }
            };

            let body = &after_open[..close];
            let (name, converter_name) = match body.split_once(':') {
                Some((n, c)) => (n.trim(), c.trim()),
                None => (body.trim(), "string"),
            };
            if !PARAM_NAME.is_match(name) {
                return Err(MalformedTemplateError::InvalidName {
                    template: template.to_owned(),
                    name: name.to_owned(),
                });
            }
            let converter = Converter::from_name(converter_name).ok_or_else(|| {
                MalformedTemplateError::UnknownConverter {
                    template: template.to_owned(),
                    name: name.to_owned(),
                    converter: converter_name.to_owned(),
                }
            })?;
            if params.iter().any(|(n, _)| n.as_ref() == name) {
                return Err(MalformedTemplateError::DuplicateParameter {
                    template: template.to_owned(),
                    name: name.to_owned(),
                });
            }

            let consumed = idx + 1 + close + 1;
            if converter == Converter::PathRemainder && consumed != rest.len() {
                return Err(MalformedTemplateError::RemainderNotLast {
                    template: template.to_owned(),
                    name: name.to_owned(),
                });
            }

            if !literal.is_empty() {
                pattern.push_str(&regex::escape(&literal));
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            pattern.push_str("(?P<");
            pattern.push_str(name);
            pattern.push('>');
            pattern.push_str(converter.pattern());
            pattern.push(')');
            segments.push(Segment::Param(params.len()));
            params.push((Arc::from(name), converter));

            rest = &rest[consumed..];
            offset += consumed;
        }
        if !literal.is_empty() {
            pattern.push_str(&regex::escape(&literal));
            segments.push(Segment::Literal(literal));
        }
        pattern.push('$');

        let matcher = Regex::new(&pattern).map_err(|e| MalformedTemplateError::Matcher {
            template: template.to_owned(),
            reason: e.to_string(),
        })?;

        debug!(
            template = %template,
            matcher = %pattern,
            params = params.len(),
            "Path template compiled"
        );

        Ok(Self {
            template: template.to_owned(),
            matcher,
            params,
            segments,
        })
    }

    /// The template string as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(n, _)| n.as_ref())
    }

    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|(n, _)| n.as_ref() == name)
    }

    #[must_use]
    pub fn converter(&self, name: &str) -> Option<Converter> {
        self.params
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, c)| *c)
    }

    /// Match `path` and convert every placeholder.
    ///
    /// Returns `Ok(None)` when the path does not match.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when the path matches but a converter
    /// rejects its capture.
    pub fn try_match(&self, path: &str) -> Result<Option<PathValues>, ConversionError> {
        let Some(caps) = self.matcher.captures(path) else {
            return Ok(None);
        };
        let mut values = PathValues::new();
        for (name, converter) in &self.params {
            let raw = caps.name(name).map_or("", |m| m.as_str());
            values.push((Arc::clone(name), converter.convert(name, raw)?));
        }
        Ok(Some(values))
    }

    /// Match `path`, folding conversion failures into a non-match.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathValues> {
        match self.try_match(path) {
            Ok(values) => values,
            Err(err) => {
                debug!(
                    template = %self.template,
                    path = %path,
                    error = %err,
                    "Path conversion failed, treating as non-match"
                );
                None
            }
        }
    }

    /// Substitute `values` into the template.
    ///
    /// Returns `None` when a placeholder is missing from `values` or its
    /// value cannot be formatted by the placeholder's converter.
    #[must_use]
    pub fn render(&self, values: &Map<String, Value>) -> Option<String> {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(idx) => {
                    let (name, converter) = self.params.get(*idx)?;
                    out.push_str(&converter.format(values.get(name.as_ref())?)?);
                }
            }
        }
        Some(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Shorthand for [`PathTemplate::compile`].
///
/// # Errors
///
/// See [`PathTemplate::compile`].
pub fn compile(template: &str) -> Result<PathTemplate, MalformedTemplateError> {
    PathTemplate::compile(template)
}
