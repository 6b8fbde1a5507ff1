//! Remote control surface over HTTP.
//!
//! Every request is turned into a job on the serialized executor, so a
//! remote unit is reconciled exactly like one typed at the local prompt.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{LiveloadError, Result};
use crate::executor::{EngineHandle, EngineStatus};
use crate::orchestrator::UnitOutcome;
use crate::value::Value;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5005;

/// The whole body of a successful `/switch`, the first line of a successful `/eval`.
pub const ACK: &str = "OK";

const BANNER: &str = "liveload remote control: POST code to /eval?in-module=<context>, a context name to /switch\n";

/// Accepts code and context switches from outside the process and forwards
/// them to the executor.
#[derive(Clone)]
pub struct ControlSurface {
    engine: EngineHandle,
}

impl ControlSurface {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// Evaluates `code` in the active context, or detached in `target`.
    pub async fn submit(&self, code: &[u8], target: Option<&str>) -> Result<UnitOutcome> {
        let code = utf8(code)?;
        self.engine.submit(code, target).await
    }

    pub async fn switch(&self, target: &[u8]) -> Result<()> {
        let target = utf8(target)?.trim();
        if target.is_empty() {
            return Err(LiveloadError::BadRequest("no context named".into()));
        }
        self.engine.switch(target).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.engine.status().await
    }
}

fn utf8(body: &[u8]) -> Result<&str> {
    std::str::from_utf8(body)
        .map_err(|e| LiveloadError::BadRequest(format!("body is not valid UTF-8: {e}")))
}

/// Plain text is `text/plain`, or the legacy `plain/text` older clients send.
pub fn require_plain_text(headers: &HeaderMap) -> Result<()> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let lowered = content_type.trim().to_ascii_lowercase();
    if lowered.starts_with("text/plain") || lowered.starts_with("plain/text") {
        Ok(())
    } else {
        Err(LiveloadError::BadRequest(format!(
            "expected a plain text body, got content type '{content_type}'"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct EvalQuery {
    #[serde(rename = "in-module")]
    in_module: Option<String>,
}

pub fn router(surface: ControlSurface) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/", get(banner))
        .route("/eval", post(eval))
        .route("/switch", post(switch))
        .route("/status", get(status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(surface)
}

async fn banner() -> &'static str {
    BANNER
}

async fn eval(
    State(surface): State<ControlSurface>,
    Query(query): Query<EvalQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = require_plain_text(&headers) {
        return error_response(e);
    }
    let target = query.in_module.as_deref().filter(|name| !name.is_empty());
    match surface.submit(&body, target).await {
        Ok(outcome) => (StatusCode::OK, render(&outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn switch(State(surface): State<ControlSurface>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = require_plain_text(&headers) {
        return error_response(e);
    }
    match surface.switch(&body).await {
        Ok(()) => (StatusCode::OK, ACK).into_response(),
        Err(e) => error_response(e),
    }
}

async fn status(State(surface): State<ControlSurface>) -> Response {
    match surface.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

// `OK`, then trace lines (when tracing is on) and the unit's value.
fn render(outcome: &UnitOutcome) -> String {
    let mut lines = vec![ACK.to_owned()];
    if outcome.traced {
        lines.extend(outcome.trace_lines());
    }
    if !matches!(outcome.value, Value::Nil) {
        lines.push(outcome.value.repr());
    }
    lines.join("\n")
}

fn error_response(e: LiveloadError) -> Response {
    // user code failures are a normal answer, the caller reads the text
    if let LiveloadError::Eval(err) = &e {
        return (StatusCode::OK, format!("{}\n", err.formatted())).into_response();
    }
    let status = match &e {
        LiveloadError::ContextNotFound(_) => StatusCode::NOT_FOUND,
        LiveloadError::BadRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %e, code = status.as_u16(), "remote request failed");
    (status, format!("{e}\n")).into_response()
}

struct Listening {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Explicitly started and stopped HTTP listener in front of a
/// [`ControlSurface`]. Must be used from within a tokio runtime.
pub struct RemoteControl {
    surface: ControlSurface,
    listening: Mutex<Option<Listening>>,
}

impl RemoteControl {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            surface: ControlSurface::new(engine),
            listening: Mutex::new(None),
        }
    }

    pub fn surface(&self) -> &ControlSurface {
        &self.surface
    }

    /// Binds `host:port` and starts serving. Port 0 picks an ephemeral port;
    /// the bound address is returned. Fails without touching the running
    /// server when one is already listening.
    pub async fn start(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let mut listening = self.listening.lock().await;
        if let Some(current) = listening.as_ref() {
            return Err(LiveloadError::AlreadyListening(current.addr.to_string()));
        }
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();
        let app = router(self.surface.clone());
        let task = tokio::spawn(async move {
            let serving = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = signal.await;
            });
            if let Err(e) = serving.await {
                warn!(error = %e, "remote control stopped with an error");
            }
        });
        info!(%addr, "remote control listening");
        *listening = Some(Listening {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Stops the listener. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let Some(current) = self.listening.lock().await.take() else {
            return false;
        };
        let _ = current.shutdown.send(());
        let _ = current.task.await;
        info!(addr = %current.addr, "remote control stopped");
        true
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().await.as_ref().map(|current| current.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn plain_text_variants_are_accepted() {
        assert!(require_plain_text(&headers("text/plain")).is_ok());
        assert!(require_plain_text(&headers("text/plain; charset=utf-8")).is_ok());
        assert!(require_plain_text(&headers("plain/text")).is_ok());
    }

    #[test]
    fn other_content_types_are_rejected() {
        assert!(matches!(
            require_plain_text(&headers("application/json")),
            Err(LiveloadError::BadRequest(_))
        ));
        assert!(require_plain_text(&HeaderMap::new()).is_err());
    }

    #[test]
    fn render_acknowledges_and_skips_nil() {
        assert_eq!(render(&UnitOutcome::default()), "OK");
        let outcome = UnitOutcome {
            value: Value::str("new foo"),
            ..UnitOutcome::default()
        };
        assert_eq!(render(&outcome), "OK\n\"new foo\"");
    }
}
