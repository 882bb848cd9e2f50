use super::callable::{Callable, Produced};
use super::context::ResolutionContext;
use super::graph::Dependant;
use super::values::Values;
use crate::errors::ResolutionFailure;
use crate::params::{Location, ParameterSpec};
use crate::validator::{FieldError, RawValue, ValueValidator};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Output of resolving one dependency tree.
#[derive(Debug)]
pub struct Solved {
    /// Inputs for the tree's root callable.
    pub values: Values,
    /// Every validation error found while resolving the tree.
    pub errors: Vec<FieldError>,
}

/// Walks a [`Dependant`] tree post-order against one request's context.
///
/// Children resolve before their parent, strictly in declaration order.
/// Validation errors are collected, never raised; a dependency whose own
/// inputs failed validation is skipped and its siblings still resolve.
pub struct Resolver<'v> {
    validator: &'v dyn ValueValidator,
}

impl<'v> Resolver<'v> {
    #[must_use]
    pub fn new(validator: &'v dyn ValueValidator) -> Self {
        Self { validator }
    }

    /// Resolve `dependant` and return the root's inputs with the errors
    /// collected along the way.
    ///
    /// # Errors
    ///
    /// [`ResolutionFailure`] when a dependency callable fails. Finalizers
    /// registered before the failure stay on the context and run when it
    /// closes.
    pub async fn resolve(
        &self,
        dependant: &Dependant,
        ctx: &mut ResolutionContext,
    ) -> Result<Solved, ResolutionFailure> {
        let start = ctx.error_count();
        let (values, _) = self.resolve_node(dependant, ctx).await?;
        let mut seen = HashSet::new();
        let mut errors = ctx.errors_since(start);
        errors.retain(|e| seen.insert((e.location, e.field.clone(), e.kind, e.message.clone())));
        Ok(Solved { values, errors })
    }

    /// Resolve `node`'s children and extract its own parameters.
    ///
    /// The flag is `false` when the node must not be invoked: one of its own
    /// inputs failed validation, or a dependency below it did, in this walk
    /// or an earlier one in the same request.
    fn resolve_node<'a>(
        &'a self,
        node: &'a Dependant,
        ctx: &'a mut ResolutionContext,
    ) -> BoxFuture<'a, Result<(Values, bool), ResolutionFailure>> {
        async move {
            let mut values = Values::new(Arc::clone(ctx.request()), Arc::clone(&node.security_scopes));
            let mut complete = true;

            for child in &node.dependencies {
                let param_name = child.name.as_deref().unwrap_or(&child.key);

                if ctx.is_invalid(&child.cache_key) {
                    trace!(
                        request_id = %ctx.request_id(),
                        dependency = %child.key,
                        cache_key = %child.cache_key,
                        "Dependency already failed validation"
                    );
                    complete = false;
                    continue;
                }

                if child.use_cache {
                    if let Some(hit) = ctx.cached(&child.cache_key) {
                        trace!(
                            request_id = %ctx.request_id(),
                            dependency = %child.key,
                            cache_key = %child.cache_key,
                            "Dependency cache hit"
                        );
                        let hit = Arc::clone(hit);
                        values.insert_resolved(param_name, hit);
                        continue;
                    }
                }

                let before = ctx.error_count();
                let (child_values, child_complete) = self.resolve_node(child, ctx).await?;
                if !child_complete {
                    debug!(
                        request_id = %ctx.request_id(),
                        dependency = %child.key,
                        errors = ctx.error_count() - before,
                        "Dependency inputs invalid, skipping invocation"
                    );
                    ctx.mark_invalid(child.cache_key.clone());
                    complete = false;
                    continue;
                }

                let produced = invoke(child, child_values, ctx).await?;
                if child.use_cache {
                    ctx.store(child.cache_key.clone(), Arc::clone(&produced));
                }
                values.insert_resolved(param_name, produced);
            }

            for name in &node.context_params {
                values.insert_context(name);
            }

            let before = ctx.error_count();
            self.extract(node, ctx, &mut values);
            complete &= ctx.error_count() == before;
            Ok((values, complete))
        }
        .boxed()
    }

    fn extract(&self, node: &Dependant, ctx: &mut ResolutionContext, values: &mut Values) {
        for spec in &node.path_params {
            let raw = ctx.path_value(&spec.alias).cloned().map(RawValue::Json);
            self.apply(spec, raw, ctx, values);
        }

        for spec in &node.query_params {
            let raw = {
                let query = ctx.request().query();
                if spec.ty.is_array() {
                    let all: Vec<String> = query.get_all(&spec.alias).map(str::to_owned).collect();
                    (!all.is_empty()).then_some(RawValue::List(all))
                } else {
                    query.get(&spec.alias).map(|v| RawValue::Text(v.to_owned()))
                }
            };
            self.apply(spec, raw, ctx, values);
        }

        for spec in &node.header_params {
            let raw = {
                let request = ctx.request();
                if spec.ty.is_array() {
                    let all: Vec<String> = request.header_all(&spec.alias).map(str::to_owned).collect();
                    (!all.is_empty()).then_some(RawValue::List(all))
                } else {
                    request.header(&spec.alias).map(|v| RawValue::Text(v.to_owned()))
                }
            };
            self.apply(spec, raw, ctx, values);
        }

        if node.body_params.is_empty() {
            return;
        }
        let request = Arc::clone(ctx.request());
        let body = request.json();

        if let [only] = node.body_params.as_slice() {
            if !only.embed {
                let start = ctx.error_count();
                self.apply(only, body.cloned().map(RawValue::Json), ctx, values);
                ctx.unnest_errors_since(start, &only.alias);
                return;
            }
        }

        match body {
            None => {
                for spec in &node.body_params {
                    self.apply(spec, None, ctx, values);
                }
            }
            Some(Value::Object(fields)) => {
                for spec in &node.body_params {
                    let raw = fields.get(&spec.alias).cloned().map(RawValue::Json);
                    self.apply(spec, raw, ctx, values);
                }
            }
            Some(_) => {
                for spec in &node.body_params {
                    ctx.push_error(FieldError::missing(Location::Body, &spec.alias));
                }
            }
        }
    }

    fn apply(
        &self,
        spec: &ParameterSpec,
        raw: Option<RawValue>,
        ctx: &mut ResolutionContext,
        values: &mut Values,
    ) {
        let raw = raw.filter(|r| !matches!(r, RawValue::Json(Value::Null)));
        match raw {
            None if spec.required => {
                ctx.push_error(FieldError::missing(spec.location, &spec.alias));
            }
            None => {
                values.insert_param(&spec.name, spec.default.clone().unwrap_or(Value::Null));
            }
            Some(raw) => match self.validator.validate(raw, spec) {
                Ok(value) => values.insert_param(&spec.name, value),
                Err(errors) => ctx.extend_errors(errors),
            },
        }
    }
}

async fn invoke(
    node: &Dependant,
    values: Values,
    ctx: &mut ResolutionContext,
) -> Result<Produced, ResolutionFailure> {
    let Some(call) = &node.call else {
        return Err(ResolutionFailure::Misuse(format!(
            "'{}' is a route root and cannot be invoked as a dependency",
            node.key
        )));
    };
    let produced = match call {
        Callable::Plain(f) => f(values)
            .await
            .map_err(|e| ResolutionFailure::from_dependency(&node.key, e))?,
        Callable::Scoped(f) => {
            let (value, finalizer) = f(values)
                .await
                .map_err(|e| ResolutionFailure::from_dependency(&node.key, e))?;
            ctx.push_finalizer(Arc::clone(&node.key), finalizer);
            value
        }
    };
    debug!(
        request_id = %ctx.request_id(),
        dependency = %node.key,
        kind = ?call.kind(),
        "Dependency resolved"
    );
    Ok(produced)
}
