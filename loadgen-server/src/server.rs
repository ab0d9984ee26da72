use crate::seed::{SeedError, Seeder};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Json, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use loadgen::{BroadcastSink, RunConfig, RunController, StartError};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("address parsing error")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

pub struct ServerState {
    pub controller: RunController,
    pub sink: Arc<BroadcastSink>,
    pub seeder: Seeder,
    pub backend_address: String,
}

pub async fn serve(port: u16, state: ServerState) -> Result<(), ServerError> {
    let app = Router::new()
        .route("/api/start-test", post(start_test))
        .route("/api/stop-test", post(stop_test))
        .route("/api/load-mocks", post(load_mocks))
        .route("/api/check-mocks", get(check_mocks))
        .route("/ws", get(ws))
        .with_state(Arc::new(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let socket_addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    info!(%socket_addr, "control server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Error, Debug)]
enum HandlerError {
    #[error("start rejected: {0}")]
    Start(#[from] StartError),

    #[error("mock seeding failed: {0}")]
    Seed(#[from] SeedError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        use HandlerError::*;
        match self {
            Start(StartError::AlreadyRunning) => (
                StatusCode::CONFLICT,
                "A test is already running".to_string(),
            ),
            Seed(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load mocks: {err}"),
            ),
        }
        .into_response()
    }
}

#[instrument(skip_all)]
async fn start_test(
    State(state): State<Arc<ServerState>>,
    Json(mut config): Json<RunConfig>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    // The target backend is fixed by deployment, not by the caller.
    config.backend_address = state.backend_address.clone();
    state.controller.start(config)?;
    Ok(Json(json!({"status": "Test started"})))
}

#[instrument(skip_all)]
async fn stop_test(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    state.controller.stop();
    Json(json!({"status": "Test stopped"}))
}

#[instrument(skip_all)]
async fn load_mocks(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    state.seeder.load_and_post().await?;
    Ok(Json(json!({"status": "Mocks loaded successfully"})))
}

#[instrument(skip_all)]
async fn check_mocks(State(state): State<Arc<ServerState>>) -> Response {
    Json(state.seeder.check().await).into_response()
}

async fn ws(State(state): State<Arc<ServerState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Streams every published snapshot to the socket as a JSON text frame.
/// A subscriber that falls behind the broadcast buffer skips the missed
/// snapshots and resumes from the newest one.
async fn handle_ws(socket: WebSocket, state: Arc<ServerState>) {
    let mut snapshots = state.sink.subscribe();
    let (mut outbound, mut inbound) = socket.split();

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => match snapshot {
                Ok(snapshot) => {
                    let Ok(text) = serde_json::to_string(&snapshot) else {
                        continue;
                    };
                    if outbound.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = inbound.next() => match msg {
                // Inbound frames are ignored; only closure matters.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    debug!("websocket observer disconnected");
}
