//! # Path Module
//!
//! Compiles declarative route templates into anchored matchers with typed
//! placeholder conversion.
//!
//! ## Template syntax
//!
//! Literal text is matched verbatim (regex metacharacters are escaped).
//! Placeholders take the form `{name}` or `{name:converter}`:
//!
//! | Converter | Aliases | Matches | Produces |
//! |---|---|---|---|
//! | `string` (default) | `str` | any run of characters except `/` | JSON string |
//! | `integer` | `int` | `-?[0-9]+` | JSON integer (`i64`) |
//! | `path-remainder` | `path` | everything, `/` included | JSON string |
//!
//! `path-remainder` is only legal as the final component of a template.
//!
//! ## Matching policy
//!
//! - Matchers are anchored at both ends; `/users/{id}` never matches
//!   `/users/1/posts`.
//! - Matching is case-sensitive.
//! - No trailing-slash normalisation is performed; register both forms if
//!   both must be served.
//! - An integer capture that overflows `i64` yields a [`ConversionError`],
//!   which the router treats as a non-match.
//!
//! ## Example
//!
//! ```rust
//! use brrtfn::path::PathTemplate;
//! use serde_json::json;
//!
//! let template = PathTemplate::compile("/users/{user_id:integer}").unwrap();
//! let values = template.matches("/users/42").unwrap();
//! assert_eq!(values[0].1, json!(42));
//! assert!(template.matches("/users/abc").is_none());
//! ```

mod core;

pub use core::{
    compile, ConversionError, Converter, MalformedTemplateError, PathTemplate, PathValues,
    MAX_INLINE_PARAMS,
};
