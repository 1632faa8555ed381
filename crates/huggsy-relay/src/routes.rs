//! HTTP routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, header},
    response::{Html, IntoResponse},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::debug;

use crate::error::RelayError;
use crate::relay::Relay;
use crate::sse::create_sse_stream;

/// Shared state for the web server.
pub struct AppState {
    pub relay: Arc<Relay>,
}

/// Create the relay router.
///
/// Endpoints are mounted both under `/api` and at the root. When `static_dir`
/// is given it serves the companion UI for any other path; otherwise `/`
/// serves a minimal built-in transcript viewer.
pub fn create_router(relay: Arc<Relay>, static_dir: Option<&str>) -> Router {
    let state = Arc::new(AppState { relay });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
        .route("/api/chatbot", post(ingest))
        .route("/api/events", get(events))
        .route("/api/messages", get(messages))
        .route("/chatbot", post(ingest))
        .route("/events", get(events))
        .route("/messages", get(messages))
        .route("/health", get(health));

    router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.route("/", get(index)),
    };

    router.layer(cors).with_state(state)
}

/// Body of an ingest request.
///
/// Fields are optional here so that a well-formed body missing a field is
/// reported as a validation error rather than a parse error.
#[derive(Debug, Deserialize)]
struct IngestRequest {
    #[serde(default, alias = "event")]
    kind: Option<String>,
    #[serde(default, alias = "message")]
    payload: Option<String>,
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    let request: IngestRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, body = %String::from_utf8_lossy(&body), "rejected malformed ingest body");
        RelayError::MalformedBody(e)
    })?;

    let kind = request.kind.unwrap_or_default();
    let payload = request.payload.unwrap_or_default();
    state.relay.ingest(&kind, &payload).await?;

    Ok(Json(json!({ "status": "ok" })))
}

async fn events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscription = state.relay.subscribe();
    create_sse_stream(subscription, state.relay.keepalive())
}

async fn messages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.relay.snapshot().await)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let history = state.relay.history();
    let durable = history.is_durable();

    Json(json!({
        "status": if durable { "ok" } else { "degraded" },
        "durable": durable,
        "subscribers": state.relay.hub().subscriber_count(),
        "history_len": history.len().await,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Huggsy</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; background: #fdf6ec; color: #333; }
  header { padding: 1rem; background: #ffb562; color: #fff; font-weight: 600; }
  #status { font-size: 0.8rem; font-weight: 400; margin-left: 0.5rem; }
  #log { list-style: none; margin: 0; padding: 1rem; }
  #log li { margin: 0.4rem 0; padding: 0.5rem 0.75rem; border-radius: 0.75rem; max-width: 80%; }
  .user_speech { background: #e3f2fd; }
  .ai_response { background: #fff; margin-left: auto; }
  .ai_emotion { background: transparent; font-style: italic; color: #999; text-align: right; margin-left: auto; }
  .ts { font-size: 0.7rem; color: #aaa; margin-right: 0.4rem; }
</style>
</head>
<body>
<header>Huggsy <span id="status">connecting…</span></header>
<ul id="log"></ul>
<script>
  const log = document.getElementById('log');
  const status = document.getElementById('status');

  function append(record) {
    const li = document.createElement('li');
    li.className = record.kind;
    const ts = document.createElement('span');
    ts.className = 'ts';
    ts.textContent = record.timestamp;
    li.appendChild(ts);
    li.appendChild(document.createTextNode(record.payload));
    log.appendChild(li);
    window.scrollTo(0, document.body.scrollHeight);
  }

  async function catchUp() {
    log.innerHTML = '';
    const res = await fetch('/api/messages');
    (await res.json()).forEach(append);
  }

  function connect() {
    const source = new EventSource('/api/events');
    source.onmessage = (e) => {
      const record = JSON.parse(e.data);
      if (record.kind === 'connected') {
        status.textContent = 'live';
        catchUp();
      } else {
        append(record);
      }
    };
    source.onerror = () => { status.textContent = 'reconnecting…'; };
  }

  connect();
</script>
</body>
</html>
"#;
