use brrtfn::app::App;
use brrtfn::dependencies::{Dependency, Handler, Scoped};
use brrtfn::params::Param;
use brrtfn::request::Request;
use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use serde_json::json;
use std::hint::black_box;

fn zoo_app() -> brrtfn::Dispatcher {
    let mut app = App::new();
    app.dependency(Dependency::scoped_sync("db", |_| {
        Ok(Scoped::with_sync_cleanup(String::from("conn"), || Ok(())))
    }))
    .dependency(
        Dependency::plain_sync("pagination", |v| {
            Ok(json!({"skip": v.get::<i64>("skip")?, "limit": v.get::<i64>("limit")?}))
        })
        .params([
            Param::integer("skip").default(0).minimum(0),
            Param::integer("limit").default(10).maximum(100),
        ]),
    );

    let echo = |name: &str| Handler::sync(name, |v| Ok(v.params_json()));
    app.get("/", echo("root_handler"))
        .and_then(|a| a.get("/zoo/animals", echo("get_animals").param(Param::depends("page", "pagination"))))
        .and_then(|a| {
            a.post(
                "/zoo/animals",
                echo("create_animal").params([
                    Param::string("name").embed().min_length(1),
                    Param::integer("legs").body().minimum(0),
                    Param::depends("db", "db"),
                ]),
            )
        })
        .and_then(|a| a.get("/zoo/animals/{id:int}", echo("get_animal").param(Param::integer("id"))))
        .and_then(|a| {
            a.get(
                "/zoo/animals/{id:int}/toys/{toy_id:int}",
                echo("animal_toy").params([Param::integer("id"), Param::integer("toy_id")]),
            )
        })
        .and_then(|a| {
            a.get(
                "/zoo/{category}/animals/{id:int}/habitats/{habitat_id:int}/sections/{section_id:int}",
                echo("habitat_section").params([
                    Param::string("category"),
                    Param::integer("id"),
                    Param::integer("habitat_id"),
                    Param::integer("section_id"),
                ]),
            )
        })
        .and_then(|a| a.get("/static/{rest:path}", echo("static_file").param(Param::string("rest"))))
        .unwrap();
    app.build()
}

fn bench_route_match(c: &mut Criterion) {
    let dispatcher = zoo_app();
    let router = dispatcher.router();
    let test_paths = [
        (Method::GET, "/zoo/animals/123"),
        (Method::GET, "/zoo/animals/123/toys/456"),
        (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
        (Method::GET, "/static/css/site/main.css"),
        (Method::GET, "/no/such/route"),
    ];
    c.bench_function("route_match", |b| {
        b.iter(|| {
            for (method, path) in &test_paths {
                black_box(router.route(method, path));
            }
        });
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = zoo_app();
    c.bench_function("dispatch_query_dependency", |b| {
        b.iter(|| {
            let request = Request::get("/zoo/animals?skip=5&limit=20");
            black_box(futures::executor::block_on(dispatcher.dispatch(request)));
        });
    });
    c.bench_function("dispatch_scoped_body", |b| {
        let body = json!({"name": "okapi", "legs": 4});
        b.iter(|| {
            let request = Request::post("/zoo/animals").with_json(&body);
            black_box(futures::executor::block_on(dispatcher.dispatch(request)));
        });
    });
    c.bench_function("dispatch_validation_failure", |b| {
        b.iter(|| {
            let request = Request::get("/zoo/animals?limit=1000");
            black_box(futures::executor::block_on(dispatcher.dispatch(request)));
        });
    });
}

criterion_group!(benches, bench_route_match, bench_dispatch);
criterion_main!(benches);
