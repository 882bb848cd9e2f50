use super::*;
use crate::dependencies::{Dependency, DependencyRegistry, Handler, Overrides};
use crate::errors::RegistrationError;
use crate::params::Param;
use http::Method;
use serde_json::{json, Map};

fn handler(name: &str) -> Handler {
    Handler::sync(name, |_| Ok(json!(null)))
}

#[test]
fn test_first_registered_route_wins() {
    let mut router = Router::default();
    router
        .register(&["GET"], "/users/{name}", handler("by_name"), None)
        .unwrap();
    router
        .register(&["GET"], "/users/me", handler("me"), None)
        .unwrap();

    let hit = router.route(&Method::GET, "/users/me").unwrap();
    assert_eq!(hit.route.name(), "by_name");
    assert_eq!(hit.path_value("name"), Some(&json!("me")));
}

#[test]
fn test_method_is_checked_before_path() {
    let mut router = Router::default();
    router
        .register(&["post"], "/items", handler("create"), None)
        .unwrap();
    router
        .register(&["GET", "HEAD"], "/items", handler("list"), None)
        .unwrap();

    assert_eq!(router.route(&Method::GET, "/items").unwrap().route.name(), "list");
    assert_eq!(router.route(&Method::POST, "/items").unwrap().route.name(), "create");
    assert!(router.route(&Method::DELETE, "/items").is_none());
}

#[test]
fn test_conversion_failure_falls_through() {
    let mut router = Router::default();
    router
        .register(&["GET"], "/items/{id:int}", handler("by_id"), None)
        .unwrap();
    router
        .register(&["GET"], "/items/{slug}", handler("by_slug"), None)
        .unwrap();

    assert_eq!(router.route(&Method::GET, "/items/12").unwrap().route.name(), "by_id");
    assert_eq!(router.route(&Method::GET, "/items/pen").unwrap().route.name(), "by_slug");
}

#[test]
fn test_trailing_slash_is_significant() {
    let mut router = Router::default();
    router.register(&["GET"], "/users", handler("list"), None).unwrap();
    assert!(router.route(&Method::GET, "/users").is_some());
    assert!(router.route(&Method::GET, "/users/").is_none());
}

#[test]
fn test_registration_errors_fail_fast() {
    let mut router = Router::default();
    assert!(matches!(
        router.register(&["GET"], "/a/{id", handler("h"), None),
        Err(RegistrationError::MalformedTemplate(_))
    ));
    assert!(matches!(
        router.register(&["GE T"], "/a", handler("h"), None),
        Err(RegistrationError::UnsupportedMethod(_))
    ));
    let none: [&str; 0] = [];
    assert!(matches!(
        router.register(&none, "/a", handler("h"), None),
        Err(RegistrationError::NoMethods(_))
    ));
    assert!(matches!(
        router.register(
            &["GET"],
            "/a",
            handler("h").param(Param::depends("db", "db")),
            None
        ),
        Err(RegistrationError::UnknownDependency { .. })
    ));
    assert!(router.routes().is_empty());
}

#[test]
fn test_overrides_are_route_local() {
    let registry = DependencyRegistry::new().with(Dependency::value("db", "real"));
    let mut router = Router::new(registry);
    let fake = Dependency::value("db", "fake");
    let fake_id = fake.id();
    let overrides = Overrides::new().with("db", fake);

    let with = router
        .register(
            &["GET"],
            "/a",
            handler("a").param(Param::depends("db", "db")),
            Some(&overrides),
        )
        .unwrap();
    let without = router
        .register(&["GET"], "/b", handler("b").param(Param::depends("db", "db")), None)
        .unwrap();

    assert_eq!(with.dependant().dependencies()[0].cache_key().id(), fake_id);
    assert_ne!(without.dependant().dependencies()[0].cache_key().id(), fake_id);
}

#[test]
fn test_invalid_response_shape_is_rejected() {
    let mut router = Router::default();
    let err = router
        .register_with(
            &["GET"],
            "/a",
            handler("a"),
            RouteOptions::new().response_shape(json!({"type": "not-a-type"})),
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidResponseShape { ref route, .. } if route == "a"));
}

#[test]
fn test_url_for_renders_named_route() {
    let mut router = Router::default();
    router
        .register_with(
            &["GET"],
            "/users/{id:int}/files/{rest:path}",
            handler("h"),
            RouteOptions::new().name("user_file"),
        )
        .unwrap();

    let mut values = Map::new();
    values.insert("id".into(), json!(7));
    values.insert("rest".into(), json!("a/b.txt"));
    assert_eq!(
        router.url_for("user_file", &values).as_deref(),
        Some("/users/7/files/a/b.txt")
    );
    assert_eq!(router.url_for("missing", &values), None);
}
