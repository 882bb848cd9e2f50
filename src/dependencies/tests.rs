use super::*;
use crate::errors::{RegistrationError, ResolutionFailure};
use crate::params::Param;
use crate::path::PathTemplate;
use crate::request::Request;
use crate::response::HttpError;
use crate::validator::{ErrorKind, SchemaValidator};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn template(raw: &str) -> PathTemplate {
    PathTemplate::compile(raw).unwrap()
}

fn noop_handler(params: Vec<Param>) -> Handler {
    Handler::sync("handler", |_| Ok(json!(null))).params(params)
}

fn build(
    raw: &str,
    handler: &Handler,
    registry: &DependencyRegistry,
    overrides: Option<&Overrides>,
) -> Result<Dependant, RegistrationError> {
    build_dependant(&template(raw), handler, registry, overrides, &SchemaValidator::default())
}

fn counting(name: &str, counter: &Arc<AtomicUsize>) -> Dependency {
    let counter = Arc::clone(counter);
    Dependency::plain_sync(name, move |_| Ok(counter.fetch_add(1, Ordering::SeqCst) + 1))
}

fn context_for(raw_template: &str, request: Request) -> ResolutionContext {
    let path_values = template(raw_template).matches(request.path()).unwrap();
    ResolutionContext::new(Arc::new(request), path_values)
}

#[test]
fn test_mutual_cycle_is_rejected_with_path() {
    let registry = DependencyRegistry::new()
        .with(Dependency::value("a", 1u8).param(Param::depends("b", "b")))
        .with(Dependency::value("b", 2u8).param(Param::depends("a", "a")));
    let handler = noop_handler(vec![Param::depends("a", "a")]);

    let err = build("/", &handler, &registry, None).unwrap_err();
    match err {
        RegistrationError::CyclicDependency { key, path } => {
            assert_eq!(key, "a");
            assert_eq!(path, "a -> b -> a");
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[test]
fn test_self_cycle_is_rejected() {
    let registry =
        DependencyRegistry::new().with(Dependency::value("me", ()).param(Param::depends("me", "me")));
    let handler = noop_handler(vec![Param::depends("me", "me")]);
    assert!(matches!(
        build("/", &handler, &registry, None),
        Err(RegistrationError::CyclicDependency { .. })
    ));
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let registry = DependencyRegistry::new()
        .with(Dependency::value("db", ()))
        .with(Dependency::value("users", ()).param(Param::depends("db", "db")))
        .with(Dependency::value("orders", ()).param(Param::depends("db", "db")));
    let handler = noop_handler(vec![
        Param::depends("users", "users"),
        Param::depends("orders", "orders"),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();
    assert_eq!(root.node_count(), 5);
    assert_eq!(root.depth(), 3);
    assert_eq!(
        root.dependencies()[0].dependencies()[0].cache_key(),
        root.dependencies()[1].dependencies()[0].cache_key()
    );
}

#[test]
fn test_unknown_dependency_names_the_requirer() {
    let registry = DependencyRegistry::new().with(
        Dependency::value("session", ()).param(Param::depends("store", "store")),
    );
    let handler = noop_handler(vec![Param::depends("session", "session")]);
    assert_eq!(
        build("/", &handler, &registry, None).unwrap_err(),
        RegistrationError::UnknownDependency {
            key: "store".into(),
            required_by: "session".into(),
        }
    );
}

#[test]
fn test_duplicate_parameter_is_rejected() {
    let handler = noop_handler(vec![Param::string("q"), Param::integer("q")]);
    assert!(matches!(
        build("/", &handler, &DependencyRegistry::new(), None),
        Err(RegistrationError::InvalidParameter { ref name, .. }) if name == "q"
    ));
}

#[test]
fn test_params_are_bucketed_by_location() {
    let handler = noop_handler(vec![
        Param::integer("id"),
        Param::string("q"),
        Param::string("user_agent").header(),
        Param::any("payload").body(),
        Param::context("request"),
    ]);
    let root = build("/items/{id:int}", &handler, &DependencyRegistry::new(), None).unwrap();
    assert_eq!(root.path_params().len(), 1);
    assert_eq!(root.query_params()[0].name, "q");
    assert_eq!(root.header_params()[0].alias, "user-agent");
    assert_eq!(root.body_params().len(), 1);
    assert_eq!(root.context_params(), ["request".to_owned()]);
    assert_eq!(root.flat_params().len(), 4);
    assert_eq!(root.kind(), None);
}

#[test]
fn test_override_replaces_nested_use() {
    let registry = DependencyRegistry::new()
        .with(Dependency::value("db", "real"))
        .with(Dependency::value("repo", ()).param(Param::depends("db", "db")));
    let fake = Dependency::value("db", "fake");
    let fake_id = fake.id();
    let overrides = Overrides::new().with("db", fake);
    let handler = noop_handler(vec![Param::depends("repo", "repo")]);

    let root = build("/", &handler, &registry, Some(&overrides)).unwrap();
    assert_eq!(root.dependencies()[0].dependencies()[0].cache_key().id(), fake_id);

    let plain = build("/", &handler, &registry, None).unwrap();
    assert_ne!(plain.dependencies()[0].dependencies()[0].cache_key().id(), fake_id);
}

#[test]
fn test_scopes_accumulate_and_key_the_cache() {
    let registry = DependencyRegistry::new()
        .with(Dependency::value("token", ()))
        .with(Dependency::value("user", ()).param(Param::security("token", "token", ["me"])));
    let handler = noop_handler(vec![
        Param::security("user", "user", ["items"]),
        Param::depends("plain_token", "token"),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();

    let user = &root.dependencies()[0];
    assert_eq!(user.security_scopes(), ["items".to_owned()]);
    let nested_token = &user.dependencies()[0];
    assert_eq!(nested_token.security_scopes(), ["items".to_owned(), "me".to_owned()]);

    let plain_token = &root.dependencies()[1];
    assert_eq!(nested_token.cache_key().id(), plain_token.cache_key().id());
    assert_ne!(nested_token.cache_key(), plain_token.cache_key());
}

#[test]
fn test_cache_key_ignores_scope_order_and_duplicates() {
    let dep = Dependency::value("x", ());
    let a = CacheKey::new(dep.id(), &["b".into(), "a".into(), "a".into()]);
    let b = CacheKey::new(dep.id(), &["a".into(), "b".into()]);
    assert_eq!(a, b);
    assert_eq!(a.scopes(), ["a".to_owned(), "b".to_owned()]);
}

#[tokio::test]
async fn test_cached_dependency_runs_once_per_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = DependencyRegistry::new()
        .with(counting("counter", &calls))
        .with(Dependency::value("wrapper", ()).param(Param::depends("counter", "counter")));
    let handler = noop_handler(vec![
        Param::depends("wrapper", "wrapper"),
        Param::depends("counter", "counter"),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();

    let mut ctx = context_for("/", Request::get("/"));
    let solved = Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*solved.values.dep::<usize>("counter").unwrap(), 1);

    let mut next = context_for("/", Request::get("/"));
    Resolver::new(&validator).resolve(&root, &mut next).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_no_cache_reinvokes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = DependencyRegistry::new().with(counting("counter", &calls));
    let handler = noop_handler(vec![
        Param::depends("first", "counter"),
        Param::depends("second", "counter").no_cache(),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/"));

    let solved = Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*solved.values.dep::<usize>("first").unwrap(), 1);
    assert_eq!(*solved.values.dep::<usize>("second").unwrap(), 2);
}

#[tokio::test]
async fn test_invalid_inputs_skip_dependency_but_not_siblings() {
    let paginate_calls = Arc::new(AtomicUsize::new(0));
    let other_calls = Arc::new(AtomicUsize::new(0));
    let registry = DependencyRegistry::new()
        .with(counting("paginate", &paginate_calls).param(Param::integer("limit").minimum(1)))
        .with(counting("other", &other_calls));
    let handler = noop_handler(vec![
        Param::depends("paginate", "paginate"),
        Param::depends("other", "other"),
        Param::string("q"),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/?limit=0"));

    let solved = Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    assert_eq!(paginate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(other_calls.load(Ordering::SeqCst), 1);

    let kinds: Vec<(&str, ErrorKind)> = solved
        .errors
        .iter()
        .map(|e| (e.field.as_str(), e.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("limit", ErrorKind::ConstraintViolation),
            ("q", ErrorKind::Missing)
        ]
    );
}

#[tokio::test]
async fn test_shared_invalid_dependency_reports_its_errors_once() {
    let d_calls = Arc::new(AtomicUsize::new(0));
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let registry = DependencyRegistry::new()
        .with(counting("d", &d_calls).param(Param::string("token")))
        .with(counting("a", &a_calls).param(Param::depends("d", "d")))
        .with(counting("b", &b_calls).param(Param::depends("d", "d")));
    let handler = noop_handler(vec![
        Param::depends("a", "a"),
        Param::depends("b", "b"),
        Param::depends("d_again", "d").no_cache(),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/"));

    let solved = Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    assert_eq!(solved.errors.len(), 1, "{:?}", solved.errors);
    assert_eq!(solved.errors[0].field, "token");
    assert_eq!(solved.errors[0].kind, ErrorKind::Missing);
    // Nothing above the failed leaf runs, the second branch included.
    assert_eq!(d_calls.load(Ordering::SeqCst), 0);
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_same_field_from_two_dependencies_is_reported_once() {
    let registry = DependencyRegistry::new()
        .with(Dependency::value("first", ()).param(Param::integer("page")))
        .with(Dependency::value("second", ()).param(Param::integer("page")));
    let handler = noop_handler(vec![
        Param::depends("first", "first"),
        Param::depends("second", "second"),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/?page=x"));

    let solved = Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    let fields: Vec<(&str, ErrorKind)> = solved
        .errors
        .iter()
        .map(|e| (e.field.as_str(), e.kind))
        .collect();
    assert_eq!(fields, vec![("page", ErrorKind::TypeError)]);
}

#[tokio::test]
async fn test_path_and_body_values_reach_the_root() {
    let handler = noop_handler(vec![
        Param::integer("id"),
        Param::string("name").embed(),
        Param::number("price").body().minimum(0),
    ]);
    let root = build("/items/{id:int}", &handler, &DependencyRegistry::new(), None).unwrap();
    let validator = SchemaValidator::default();
    let request = Request::post("/items/7").with_json(&json!({"name": "pen", "price": 2.5}));
    let mut ctx = context_for("/items/{id:int}", request);

    let solved = Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    assert!(solved.errors.is_empty(), "{:?}", solved.errors);
    assert_eq!(solved.values.get::<i64>("id").unwrap(), 7);
    assert_eq!(solved.values.get::<String>("name").unwrap(), "pen");
    assert_eq!(solved.values.get::<f64>("price").unwrap(), 2.5);
}

#[tokio::test]
async fn test_finalizers_run_in_reverse_order_on_close() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let scoped = |name: &'static str| {
        let log = Arc::clone(&log);
        Dependency::scoped_sync(name, move |_| {
            log.lock().unwrap().push(format!("open {name}"));
            let log = Arc::clone(&log);
            Ok(Scoped::with_sync_cleanup(name, move || {
                log.lock().unwrap().push(format!("close {name}"));
                Ok(())
            }))
        })
    };
    let registry = DependencyRegistry::new()
        .with(scoped("outer"))
        .with(scoped("inner").param(Param::depends("outer", "outer")));
    let handler = noop_handler(vec![Param::depends("inner", "inner")]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/"));

    Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    assert_eq!(ctx.pending_finalizers(), 2);
    ctx.close().await.unwrap();
    assert_eq!(ctx.pending_finalizers(), 0);
    ctx.close().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["open outer", "open inner", "close inner", "close outer"]
    );
}

#[tokio::test]
async fn test_failing_finalizer_does_not_stop_the_others() {
    let closed = Arc::new(AtomicUsize::new(0));
    let ok_closed = Arc::clone(&closed);
    let registry = DependencyRegistry::new()
        .with(Dependency::scoped_sync("good", move |_| {
            let closed = Arc::clone(&ok_closed);
            Ok(Scoped::with_sync_cleanup((), move || {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        }))
        .with(Dependency::scoped_sync("bad", |_| {
            Ok(Scoped::with_sync_cleanup((), || Err(anyhow::anyhow!("rollback failed"))))
        }));
    let handler = noop_handler(vec![Param::depends("good", "good"), Param::depends("bad", "bad")]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/"));

    Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap();
    let err = ctx.close().await.unwrap_err();
    assert_eq!(err.dependency, "bad");
    assert_eq!(err.failed, 1);
    assert!(err.message.contains("rollback failed"));
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dependency_failure_keeps_earlier_finalizers() {
    let closed = Arc::new(AtomicUsize::new(0));
    let closer = Arc::clone(&closed);
    let registry = DependencyRegistry::new()
        .with(Dependency::scoped_sync("session", move |_| {
            let closed = Arc::clone(&closer);
            Ok(Scoped::with_sync_cleanup((), move || {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        }))
        .with(Dependency::plain_sync("broken", |_| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("backend unavailable"))
        }));
    let handler = noop_handler(vec![
        Param::depends("session", "session"),
        Param::depends("broken", "broken"),
    ]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/"));

    let err = Resolver::new(&validator).resolve(&root, &mut ctx).await.unwrap_err();
    assert!(matches!(err, ResolutionFailure::Dependency { ref dependency, .. } if dependency == "broken"));
    assert_eq!(ctx.pending_finalizers(), 1);
    ctx.close().await.unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_http_error_from_dependency_is_a_rejection() {
    let registry = DependencyRegistry::new().with(Dependency::plain_sync(
        "guard",
        |_| -> anyhow::Result<()> { Err(HttpError::forbidden("Not authenticated").into()) },
    ));
    let handler = noop_handler(vec![Param::depends("guard", "guard")]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();
    let mut ctx = context_for("/", Request::get("/"));

    match Resolver::new(&validator).resolve(&root, &mut ctx).await {
        Err(ResolutionFailure::Rejected(http)) => assert_eq!(http.status, 403),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_dropped_context_still_runs_finalizers() {
    let closed = Arc::new(AtomicUsize::new(0));
    let closer = Arc::clone(&closed);
    let registry = DependencyRegistry::new().with(Dependency::scoped_sync("conn", move |_| {
        let closed = Arc::clone(&closer);
        Ok(Scoped::with_sync_cleanup((), move || {
            closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }));
    let handler = noop_handler(vec![Param::depends("conn", "conn")]);
    let root = build("/", &handler, &registry, None).unwrap();
    let validator = SchemaValidator::default();

    let mut ctx = context_for("/", Request::get("/"));
    futures::executor::block_on(Resolver::new(&validator).resolve(&root, &mut ctx)).unwrap();
    drop(ctx);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}
