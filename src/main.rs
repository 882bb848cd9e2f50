use anyhow::Context as _;
use brrtfn::app::App;
use brrtfn::dependencies::{Dependency, Handler, Scoped};
use brrtfn::logging::{init_logging, LogConfig};
use brrtfn::params::{Param, ParamType};
use brrtfn::request::Request;
use brrtfn::router::RouteOptions;
use brrtfn::runtime_config::EngineConfig;
use brrtfn::security::{http_bearer, HttpCredentials};
use clap::Parser;
use http::Method;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

/// Dispatch one request against the demo application and print the response.
#[derive(Parser, Debug)]
#[command(name = "brrtfn", version, about = "brrtfn demo dispatcher", long_about = None)]
struct Cli {
    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Request target, including any query string
    #[arg(short, long)]
    path: String,

    /// Request header as `name:value`; may be repeated
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Raw request body
    #[arg(short, long)]
    body: Option<String>,

    /// YAML engine configuration; `BRRTFN_*` variables override it
    #[arg(short, long, env = "BRRTFN_CONFIG")]
    config: Option<PathBuf>,
}

fn demo_app(config: EngineConfig) -> anyhow::Result<App> {
    let mut app = App::with_config(config);

    app.dependency(Dependency::scoped_sync("db", |values| {
        let request_id = values.request().request_id();
        info!(request_id = %request_id, "Opening demo connection");
        Ok(Scoped::with_sync_cleanup(format!("conn-{request_id}"), move || {
            info!(request_id = %request_id, "Closing demo connection");
            Ok(())
        }))
    }))
    .dependency(http_bearer("bearer", true))
    .dependency(
        Dependency::plain_sync("pagination", |values| {
            Ok(json!({
                "skip": values.get::<i64>("skip")?,
                "limit": values.get::<i64>("limit")?,
            }))
        })
        .params([
            Param::integer("skip").default(0).minimum(0),
            Param::integer("limit").default(10).minimum(1).maximum(100),
        ]),
    );

    app.get(
        "/items",
        Handler::sync("list_items", |v| {
            Ok(json!({
                "page": *v.dep::<serde_json::Value>("page")?,
                "tags": v.get::<Vec<String>>("tag")?,
            }))
        })
        .params([
            Param::depends("page", "pagination"),
            Param::array("tag", ParamType::String).default(json!([])),
        ]),
    )?
    .get(
        "/items/{id:int}",
        Handler::sync("get_item", |v| {
            Ok(json!({
                "id": v.get::<i64>("id")?,
                "conn": *v.dep::<String>("db")?,
            }))
        })
        .params([Param::integer("id"), Param::depends("db", "db")]),
    )?
    .post(
        "/items",
        Handler::sync("create_item", |v| {
            Ok(json!({
                "name": v.get::<String>("name")?,
                "price": v.get::<f64>("price")?,
            }))
        })
        .params([
            Param::string("name").embed().min_length(1),
            Param::number("price").body().minimum(0),
        ]),
    )?
    .get(
        "/files/{rest:path}",
        Handler::sync("get_file", |v| Ok(json!({"path": v.get::<String>("rest")?})))
            .param(Param::string("rest")),
    )?;

    app.route_with(
        &["GET"],
        "/users/me",
        Handler::sync("current_user", |v| {
            let creds = v.dep::<Option<HttpCredentials>>("creds")?;
            Ok(json!({
                "token": (*creds).as_ref().map(|c| c.credentials.clone()),
                "internal": true,
            }))
        })
        .param(Param::security("creds", "bearer", ["me"])),
        RouteOptions::new().response_shape(json!({
            "type": "object",
            "properties": {"token": {"type": ["string", "null"]}}
        })),
    )?;

    Ok(app)
}

fn build_request(cli: &Cli) -> anyhow::Result<Request> {
    let method = Method::from_bytes(cli.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method '{}'", cli.method))?;
    let mut request = Request::new(method, &cli.path);
    for raw in &cli.headers {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("header '{raw}' is not NAME:VALUE"))?;
        request = request.with_header(name.trim(), value.trim());
    }
    if let Some(body) = &cli.body {
        request = request.with_body(body.as_bytes());
    }
    Ok(request)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&LogConfig::from_env())?;

    let config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::from_env(),
    };
    let dispatcher = demo_app(config)?.build();
    let request = build_request(&cli)?;

    let response = dispatcher.handle(request).await;
    println!("{}", response.status);
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(())
}
