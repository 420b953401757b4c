//! HTTP surface for serve mode.
//!
//! `GET /` returns a page that polls `GET /frame` and swaps the text into a
//! `<pre>`. `GET /frame` answers with the latest published frame, or an empty
//! body before the first one. Handlers only read from the [`FrameStore`];
//! they never wait on the render loop.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::error::{Error, Result};
use crate::shutdown::Shutdown;
use crate::store::FrameStore;

/// Header carrying the store sequence number of the returned frame.
pub const SEQUENCE_HEADER: &str = "x-frame-sequence";

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>vidascii</title>
<style>
  html, body { margin: 0; background: #000; color: #fff; }
  #frame { margin: 0; font-family: monospace; font-size: 6px; line-height: 6px; white-space: pre; }
</style>
</head>
<body>
<pre id="frame"></pre>
<script>
  const target = document.getElementById("frame");
  async function tick() {
    try {
      const res = await fetch("/frame", { cache: "no-store" });
      if (res.ok) {
        target.textContent = await res.text();
      }
    } catch (e) {}
  }
  setInterval(tick, __POLL_INTERVAL_MS__);
  tick();
</script>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    store: Arc<FrameStore>,
    page: Arc<str>,
}

/// Renders the viewer page for the given poll interval.
pub fn index_html(poll_interval_ms: u64) -> String {
    INDEX_TEMPLATE.replace("__POLL_INTERVAL_MS__", &poll_interval_ms.to_string())
}

pub fn router(store: Arc<FrameStore>, poll_interval_ms: u64) -> Router {
    let state = AppState {
        store,
        page: index_html(poll_interval_ms).into(),
    };
    Router::new()
        .route("/", get(index))
        .route("/frame", get(frame))
        .fallback(not_found)
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.page.to_string())
}

async fn frame(State(state): State<AppState>) -> Response {
    let (sequence, text) = state.store.read_latest_with_sequence();
    let mut res = (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        text.as_str().to_owned(),
    )
        .into_response();
    res.headers_mut().insert(SEQUENCE_HEADER, HeaderValue::from(sequence));
    res
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Binds the listener on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("cannot bind {}: {}", addr, e)))
}

/// Serves until `shutdown` fires, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    store: Arc<FrameStore>,
    poll_interval_ms: u64,
    shutdown: Shutdown,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Serving on http://{}", addr);
    }
    axum::serve(listener, router(store, poll_interval_ms))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .map_err(|e| Error::Server(e.to_string()))
}
