use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::Router;
use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::cli::ServeArgs;
use crate::config::EngineConfig;

#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    origin: Arc<str>,
}

impl ProxyState {
    pub fn new(origin: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build proxy http client")?;
        Ok(Self {
            client,
            origin: Arc::from(origin.trim_end_matches('/')),
        })
    }

    fn upstream_url(&self, uri: &Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        format!("{}{path_and_query}", self.origin)
    }
}

pub fn router(state: ProxyState, web_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/opds", get(proxy_catalog))
        .route("/opds/*rest", get(proxy_catalog))
        .route("/b", get(proxy_book))
        .route("/b/*rest", get(proxy_book))
        .with_state(state);

    let web_index = web_dir.map(|dir| (dir, dir.join("index.html")));
    let app = match web_index {
        Some((dir, index)) if index.exists() => {
            let static_files = ServeDir::new(dir).fallback(ServeFile::new(index));
            app.fallback_service(static_files)
        }
        _ => app.fallback(|| async {
            Html(
                r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>opdsnav</title></head>
  <body>
    <h1>opdsnav</h1>
    <p>web assets not found. Build the web app into <code>dist</code> or pass <code>--web-dir</code>.</p>
  </body>
</html>
"#,
            )
        }),
    };

    app.layer(TraceLayer::new_for_http())
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("load engine config")?;
    let origin = match args.origin.as_deref() {
        Some(raw) => crate::config::parse_origin(raw).context("parse --origin")?,
        None => config.origin,
    };

    let state = ProxyState::new(&origin)?;
    let app = router(state, Some(args.web_dir.as_path()));

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, %origin, "proxy listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve proxy")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn proxy_catalog(State(state): State<ProxyState>, OriginalUri(uri): OriginalUri) -> Response {
    let target = state.upstream_url(&uri);
    tracing::info!(%target, "proxy catalog");
    match forward_catalog(&state.client, &target).await {
        Ok(resp) => resp,
        Err(err) => proxy_error(&target, err),
    }
}

async fn proxy_book(State(state): State<ProxyState>, OriginalUri(uri): OriginalUri) -> Response {
    let target = state.upstream_url(&uri);
    tracing::info!(%target, "proxy book");
    match forward_book(&state.client, &target).await {
        Ok(resp) => resp,
        Err(err) => proxy_error(&target, err),
    }
}

async fn forward_catalog(client: &reqwest::Client, target: &str) -> anyhow::Result<Response> {
    let upstream = client
        .get(target)
        .send()
        .await
        .with_context(|| format!("GET {target}"))?;
    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let body = upstream.bytes().await.context("read upstream catalog body")?;

    let mut resp = (status, body).into_response();
    if let Some(content_type) = content_type {
        resp.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(resp)
}

async fn forward_book(client: &reqwest::Client, target: &str) -> anyhow::Result<Response> {
    let upstream = client
        .get(target)
        .send()
        .await
        .with_context(|| format!("GET {target}"))?;
    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let disposition = upstream
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("attachment"));

    let mut resp = Response::new(Body::from_stream(upstream.bytes_stream()));
    *resp.status_mut() = status;
    if let Some(content_type) = content_type {
        resp.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    resp.headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(resp)
}

fn proxy_error(target: &str, err: anyhow::Error) -> Response {
    tracing::error!(%target, err = %format!("{err:#}"), "proxy request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Proxy error").into_response()
}
