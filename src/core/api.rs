//! HTTP + WebSocket status API for the jig
//!
//! Endpoints:
//! - GET /health    - Health check
//! - GET /status    - Latest controller status
//! - GET /telemetry - Latest telemetry sample (404 until one arrives)
//! - WS  /ws        - Live status updates
//!
//! Read-only: the API never drives the hardware.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::LatestValueMailbox;
use crate::error::JigError;
use crate::types::{JigStatus, TelemetrySample};

/// Shared with the controller
#[derive(Debug, Clone)]
pub struct ApiState {
    pub status: Arc<LatestValueMailbox<JigStatus>>,
    pub telemetry: Arc<LatestValueMailbox<TelemetrySample>>,
    pub updates: broadcast::Sender<JigStatus>,
}

impl ApiState {
    pub fn new(
        status: Arc<LatestValueMailbox<JigStatus>>,
        telemetry: Arc<LatestValueMailbox<TelemetrySample>>,
    ) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            status,
            telemetry,
            updates,
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub status_published: bool,
}

/// Telemetry response
#[derive(Debug, Serialize)]
pub struct TelemetryResponse {
    pub received_at: String,
    pub fields: Map<String, Value>,
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/telemetry", get(get_telemetry))
        .route("/ws", get(websocket_handler))
        .with_state(Arc::new(state))
}

async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        status_published: !state.status.is_empty(),
    })
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Result<Json<JigStatus>, StatusCode> {
    state
        .status
        .snapshot_cloned()
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn get_telemetry(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<TelemetryResponse>, StatusCode> {
    let sample = state.telemetry.snapshot().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(TelemetryResponse {
        received_at: sample.received_at.to_rfc3339(),
        fields: sample.fields.clone(),
    }))
}

async fn websocket_handler(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.updates.subscribe();
    let current = state.status.snapshot_cloned();
    ws.on_upgrade(move |socket| handle_websocket(socket, current, rx))
}

/// Send the current status, then every update until either side goes away
async fn handle_websocket(
    socket: WebSocket,
    current: Option<JigStatus>,
    mut rx: broadcast::Receiver<JigStatus>,
) {
    let (mut sender, mut receiver) = socket.split();

    if let Some(status) = current {
        let json = serde_json::to_string(&status).unwrap_or_default();
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(status) => {
                    let json = serde_json::to_string(&status).unwrap_or_default();
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "WebSocket client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Run the API server
pub async fn run_server(addr: &str, state: ApiState) -> Result<(), JigError> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "Status API listening");
    info!("  GET /health /status /telemetry, WS /ws");
    axum::serve(listener, router).await?;
    Ok(())
}
