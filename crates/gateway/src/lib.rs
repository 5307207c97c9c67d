//! HTTP gateway for filachat.
//!
//! Routes:
//! - `POST /chat`: one user turn
//! - `POST /reset`: forget a session, in memory and on disk
//! - `GET /health`: liveness plus reachability of the remote services
//! - `GET /stats`: session store statistics
//!
//! Built on Axum.

pub mod runtime;

pub use runtime::Runtime;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use filachat_agent::Orchestrator;
use filachat_config::AppConfig;
use filachat_core::SessionId;
use filachat_memory::StoreStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
}

type SharedState = Arc<GatewayState>;

/// Build the router with every route and layer.
pub fn build_router(state: SharedState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/reset", post(reset_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the HTTP server and run until Ctrl-C.
///
/// On shutdown the autosave timer is stopped and every session is saved.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let runtime = Runtime::from_config(&config).await?;

    let state = Arc::new(GatewayState {
        orchestrator: runtime.orchestrator.clone(),
    });
    let app = build_router(state, config.gateway.body_limit);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped, saving sessions");
    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// --- Error body ---

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

// --- Handlers ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    response: String,
    session_id: SessionId,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools_used: Vec<String>,
    timestamp: DateTime<Utc>,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Response {
    if payload.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is required");
    }

    info!(
        message_len = payload.message.len(),
        has_session = payload.session_id.is_some(),
        "Chat message received"
    );

    let reply = state
        .orchestrator
        .handle(payload.session_id.as_deref(), &payload.message)
        .await;

    Json(ChatResponse {
        response: reply.text,
        session_id: reply.session_id,
        tools_used: reply.tools_used,
        timestamp: reply.timestamp,
    })
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequest {
    #[serde(default)]
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetResponse {
    session_id: String,
    reset: bool,
}

async fn reset_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ResetRequest>,
) -> Response {
    let id = payload.session_id.trim();
    if id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "sessionId is required");
    }

    match state.orchestrator.store().reset(&SessionId::from(id)).await {
        Ok(reset) => Json(ResetResponse {
            session_id: id.to_string(),
            reset,
        })
        .into_response(),
        Err(e) => {
            error!(session_id = id, error = %e, "Session reset failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: bool,
    tools: bool,
    active_sessions: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let health = state.orchestrator.health().await;
    Json(HealthResponse {
        status: if health.provider && health.tools {
            "ok"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        provider: health.provider,
        tools: health.tools,
        active_sessions: state.orchestrator.store().len().await,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    provider: String,
    model: String,
    store: StoreStats,
}

async fn stats_handler(State(state): State<SharedState>) -> Json<StatsResponse> {
    let orchestrator = &state.orchestrator;
    Json(StatsResponse {
        provider: orchestrator.provider_name().to_string(),
        model: orchestrator.model().to_string(),
        store: orchestrator.store().stats().await,
    })
}
