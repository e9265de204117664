//! HTTP transport for webhook mode.
//!
//! Accepts push notifications, verifies their signature, filters them down
//! to tracked documents, and hands the result to the relay loop as a
//! [`RelayEvent`]. The response is sent as soon as the event is queued;
//! pulling and publishing happen in the relay loop.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/webhook` | Push / ping notifications |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_signature", "message": "signature mismatch" } }
//! ```
//!
//! Error codes: `invalid_signature` (401), `bad_request` (400),
//! `unavailable` (503).

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connector_git::strip_docs_prefix;
use crate::discord::DiscordPlatform;
use crate::relay::{spawn_refresh_timer, Relay, RelayEvent};
use crate::webhook::{
    parse_event, verify_signature, PushFilter, WebhookEvent, EVENT_HEADER, SIGNATURE_HEADER,
};

#[derive(Clone)]
pub struct WebhookState {
    events: mpsc::Sender<RelayEvent>,
    /// Shared secret; `None` disables signature checks.
    secret: Option<Arc<String>>,
    filter: Arc<PushFilter>,
}

impl WebhookState {
    pub fn new(
        events: mpsc::Sender<RelayEvent>,
        secret: Option<String>,
        filter: PushFilter,
    ) -> Self {
        Self {
            events,
            secret: secret.map(Arc::new),
            filter: Arc::new(filter),
        }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve webhooks on `[webhook].bind` until the process is terminated.
pub async fn run_server(config: &Config, events: mpsc::Sender<RelayEvent>) -> anyhow::Result<()> {
    let secret = config.webhook.secret();
    if secret.is_none() {
        warn!(
            env = %config.webhook.secret_env,
            "no webhook secret configured; signatures will not be verified"
        );
    }
    let state = WebhookState::new(events, secret, PushFilter::from_config(config));

    let bind_addr = config.webhook.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "webhook server listening");
    println!("Webhook server listening on http://{}/webhook", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// `relay serve`: webhook server plus the relay loop it feeds.
pub async fn run_serve(config: &Config) -> anyhow::Result<()> {
    let platform = Arc::new(DiscordPlatform::from_config(&config.platform)?);
    let relay = Arc::new(Relay::from_config(config, platform)?);

    let (tx, rx) = mpsc::channel(64);
    let relay_task = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.run(rx).await })
    };
    let timer = spawn_refresh_timer(
        tx.clone(),
        Duration::from_secs(config.channels.refresh_interval_secs),
    );

    let result = run_server(config, tx).await;

    if let Some(timer) = timer {
        timer.abort();
    }
    relay_task.abort();
    result
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn invalid_signature() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "invalid_signature".to_string(),
        message: "signature mismatch".to_string(),
    }
}

fn unavailable() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "unavailable".to_string(),
        message: "relay is shutting down".to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /webhook ============

#[derive(Serialize)]
struct WebhookResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<usize>,
}

impl WebhookResponse {
    fn status(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
            documents: None,
        })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    if let Some(secret) = &state.secret {
        if !verify_signature(secret.as_bytes(), &body, header(&headers, SIGNATURE_HEADER)) {
            warn!("invalid webhook signature");
            return Err(invalid_signature());
        }
    }

    let kind = header(&headers, EVENT_HEADER);
    let event = parse_event(kind, &body).map_err(|e| {
        warn!(error = %e, "invalid webhook payload");
        bad_request(format!("invalid JSON: {}", e))
    })?;

    match event {
        WebhookEvent::Ping => {
            send(&state, RelayEvent::Ping).await?;
            Ok(WebhookResponse::status("pong"))
        }
        WebhookEvent::Other(kind) => {
            debug!(kind = %kind, "ignoring webhook event");
            Ok(WebhookResponse::status("ignored"))
        }
        WebhookEvent::Push(payload) => {
            let Some(changes) = state.filter.tracked_changes(&payload) else {
                debug!(branch = %payload.branch(), "ignoring push to untracked branch");
                return Ok(WebhookResponse::status("ignored"));
            };

            let to_docs = |paths: &[String]| {
                paths
                    .iter()
                    .filter_map(|p| strip_docs_prefix(p, &state.filter.docs_prefix))
                    .collect::<Vec<_>>()
            };
            let changed = to_docs(&changes.changed);
            let removed = to_docs(&changes.removed);

            info!(
                changed = changed.len(),
                removed = removed.len(),
                "push received"
            );
            let documents = changed.len();
            if !removed.is_empty() {
                send(&state, RelayEvent::FilesRemoved(removed)).await?;
            }
            if !changed.is_empty() {
                send(&state, RelayEvent::RemotePush(changed)).await?;
            }

            Ok(Json(WebhookResponse {
                status: "processing".to_string(),
                documents: Some(documents),
            }))
        }
    }
}

async fn send(state: &WebhookState, event: RelayEvent) -> Result<(), AppError> {
    state.events.send(event).await.map_err(|_| unavailable())
}
