//! API Server (Cold Path)
//!
//! Broadcast layer over the engine outputs:
//! - `/arb` WebSocket: current opportunities, then live arbitrage events
//! - `/ticker` WebSocket: live normalized quotes
//! - `/api/markets`, `/api/status` REST

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use crate::engine::EngineHandle;
use crate::hot_path::ArbMarket;
use crate::infrastructure::hub::{Frame, SubscriberHub};
use crate::infrastructure::metrics::MetricsSnapshot;
use crate::infrastructure::shutdown::ShutdownSignal;
use crate::BrokerError;

/// Per-session queue depth before a slow subscriber is dropped
const SESSION_QUEUE: usize = 256;

/// System status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDto {
    pub is_connected: bool,
    pub arb_subscribers: usize,
    pub ticker_subscribers: usize,
    pub metrics: MetricsSnapshot,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub arbs: Arc<SubscriberHub>,
    pub tickers: Arc<SubscriberHub>,
}

impl AppState {
    /// Build hubs and start forwarding engine events into them
    pub fn new(engine: EngineHandle) -> Self {
        let arbs = Arc::new(SubscriberHub::new(SESSION_QUEUE));
        let tickers = Arc::new(SubscriberHub::new(SESSION_QUEUE));
        tokio::spawn(pump(engine.subscribe_arbs(), arbs.clone(), "arb"));
        tokio::spawn(pump(engine.subscribe_quotes(), tickers.clone(), "ticker"));
        Self {
            engine,
            arbs,
            tickers,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/arb", get(arb_ws))
        .route("/ticker", get(ticker_ws))
        .route("/api/markets", get(get_markets))
        .route("/api/status", get(get_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server on `addr` until shutdown
pub async fn start_server(
    engine: EngineHandle,
    addr: &str,
    shutdown: ShutdownSignal,
) -> Result<(), BrokerError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(target: "api", "API Server listening on {}", addr);
    serve(listener, AppState::new(engine), shutdown).await
}

pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: ShutdownSignal,
) -> Result<(), BrokerError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!(target: "api", "API Server stopped");
    Ok(())
}

/// Serialize each engine event once and fan it out
async fn pump<T: Serialize + Clone>(
    mut rx: broadcast::Receiver<T>,
    hub: Arc<SubscriberHub>,
    stream: &'static str,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if hub.is_empty() {
                    continue;
                }
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        hub.publish(Frame::from(text));
                    }
                    Err(e) => tracing::warn!(target: "api", stream, error = %e, "Serialize failed"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "api", stream, skipped, "Broadcast lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn arb_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        // Join before the snapshot so no event falls between the two
        let (id, rx) = state.arbs.join();
        let snapshot = match state.engine.snapshot().await {
            Ok(arbs) => arbs,
            Err(e) => {
                tracing::warn!(target: "api", error = %e, "Snapshot unavailable");
                Vec::new()
            }
        };
        run_session(socket, &state, snapshot, rx).await;
        state.arbs.leave(&id);
    })
}

async fn ticker_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (id, rx) = state.tickers.join();
        run_session(socket, &state, Vec::new(), rx).await;
        state.tickers.leave(&id);
    })
}

async fn run_session(
    socket: WebSocket,
    state: &AppState,
    snapshot: Vec<ArbMarket>,
    mut rx: tokio::sync::mpsc::Receiver<Frame>,
) {
    let metrics = state.engine.metrics();
    metrics.subscriber_joined();
    let (mut sink, mut inbound) = socket.split();

    'session: {
        for arb in &snapshot {
            let Ok(text) = serde_json::to_string(arb) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break 'session;
            }
        }

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    // None: the hub dropped this session
                    let Some(frame) = frame else { break };
                    if sink.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                msg = inbound.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    metrics.subscriber_left();
    tracing::debug!(target: "api", "Subscriber session ended");
}

/// Handler for /api/markets
async fn get_markets(State(state): State<AppState>) -> Response {
    match state.engine.snapshot().await {
        Ok(arbs) => Json(arbs).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// Handler for /api/status
async fn get_status(State(state): State<AppState>) -> Json<StatusDto> {
    let metrics = state.engine.metrics();
    Json(StatusDto {
        is_connected: metrics.is_connected(),
        arb_subscribers: state.arbs.len(),
        ticker_subscribers: state.tickers.len(),
        metrics: metrics.snapshot(),
    })
}
