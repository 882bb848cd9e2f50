use super::types::{Classified, Location, Marker, Param, ParamType, ParameterSpec};
use crate::errors::RegistrationError;
use crate::path::PathTemplate;
use tracing::{debug, warn};

/// Classify one declared parameter against the route's template.
///
/// Priority order:
/// 1. `Depends` marker → sub-dependency
/// 2. context type → context injection
/// 3. name matches a template placeholder → path
/// 4. explicit `Path`/`Query`/`Header`/`Body` marker
/// 5. fallback → body for `object` types, query for everything else
///
/// `owner` names the handler or dependency declaring the parameter and only
/// appears in errors and logs.
///
/// # Errors
///
/// [`RegistrationError::InvalidParameter`] when a path parameter declares a
/// default, a `Path` marker names no placeholder, a context parameter
/// carries a source marker, or a parameter is both required and defaulted.
pub fn classify(
    owner: &str,
    param: &Param,
    template: &PathTemplate,
) -> Result<Classified, RegistrationError> {
    let invalid = |reason: &str| RegistrationError::InvalidParameter {
        owner: owner.to_owned(),
        name: param.name.clone(),
        reason: reason.to_owned(),
    };

    if let Some(Marker::Depends(marker)) = &param.marker {
        return Ok(Classified::SubDependency {
            name: param.name.clone(),
            marker: marker.clone(),
        });
    }

    if param.ty.is_context() {
        if let Some(marker) = &param.marker {
            return Err(invalid(&format!(
                "context parameters are injected and cannot carry a {marker} marker"
            )));
        }
        return Ok(Classified::Context {
            name: param.name.clone(),
        });
    }

    if param.required == Some(true) && param.default.is_some() {
        return Err(invalid("a required parameter cannot declare a default"));
    }

    let lookup = param.alias.as_deref().unwrap_or(&param.name);
    if template.has_param(lookup) {
        if param.default.is_some() {
            return Err(invalid("path parameters are always required and cannot declare a default"));
        }
        if let Some(marker) = param.marker.as_ref().filter(|m| !matches!(m, Marker::Path)) {
            warn!(
                owner = %owner,
                param = %param.name,
                marker = %marker,
                template = %template,
                "Parameter name matches a path placeholder; explicit marker ignored"
            );
        }
        return Ok(Classified::Param(spec(param, Location::Path, lookup.to_owned(), false)));
    }

    match &param.marker {
        Some(Marker::Path) => Err(invalid(&format!(
            "declared as a path parameter but '{template}' has no placeholder '{lookup}'"
        ))),
        Some(Marker::Query) => Ok(Classified::Param(spec(
            param,
            Location::Query,
            lookup.to_owned(),
            false,
        ))),
        Some(Marker::Header { convert_underscores }) => {
            let alias = match &param.alias {
                Some(alias) => alias.clone(),
                None if *convert_underscores => param.name.replace('_', "-"),
                None => param.name.clone(),
            };
            Ok(Classified::Param(spec(
                param,
                Location::Header,
                alias.to_ascii_lowercase(),
                false,
            )))
        }
        Some(Marker::Body { embed }) => Ok(Classified::Param(spec(
            param,
            Location::Body,
            lookup.to_owned(),
            *embed,
        ))),
        Some(Marker::Depends(_)) => Err(RegistrationError::InvalidParameter {
            owner: owner.to_owned(),
            name: param.name.clone(),
            reason: "dependency marker reached value classification".to_owned(),
        }),
        None if matches!(param.ty, ParamType::Object(_)) => {
            debug!(
                owner = %owner,
                param = %param.name,
                "Unmarked object parameter classified as body"
            );
            Ok(Classified::Param(spec(
                param,
                Location::Body,
                lookup.to_owned(),
                false,
            )))
        }
        None => {
            debug!(
                owner = %owner,
                param = %param.name,
                ty = %param.ty,
                "Unmarked parameter classified as query by fallback"
            );
            Ok(Classified::Param(spec(
                param,
                Location::Query,
                lookup.to_owned(),
                false,
            )))
        }
    }
}

fn spec(param: &Param, location: Location, alias: String, embed: bool) -> ParameterSpec {
    let required = match location {
        Location::Path => true,
        _ => param.required.unwrap_or(param.default.is_none()),
    };
    ParameterSpec {
        name: param.name.clone(),
        alias,
        ty: match &param.ty {
            ParamType::Context => ParamType::Any,
            other => other.clone(),
        },
        location,
        required,
        default: param.default.clone(),
        constraints: param.constraints.clone(),
        embed,
    }
}
