//! # Params Module
//!
//! Explicit parameter declarations and the classifier that turns them into
//! extraction specs at registration time.
//!
//! Handlers and dependencies declare their inputs as a list of [`Param`]s.
//! The classifier resolves each one, in priority order, to:
//!
//! - a **sub-dependency** (`Param::depends`), resolved before its parent,
//! - a **context injection** (`Param::context`), handed the request object,
//! - a **path** parameter, when its name matches a template placeholder,
//! - an explicitly marked **query**, **header** or **body** parameter,
//! - otherwise a **query** parameter.
//!
//! The fallback keeps declarations short but hides typos in placeholder
//! names; every fallback classification is logged at `debug`.

mod classify;
mod types;

pub use classify::classify;
pub use types::{
    Classified, DependsMarker, Location, Marker, Param, ParamSource, ParamType, ParameterSpec,
};
