use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{AuditError, Result},
    event::AuditEvent,
    ingest::Ingestor,
    store::AuditStore,
};

#[derive(Clone)]
pub struct AppState {
    store: Arc<AuditStore>,
    ingest: Arc<Ingestor>,
}

impl AppState {
    pub fn new(store: Arc<AuditStore>) -> Self {
        let ingest = Arc::new(Ingestor::new(Arc::clone(&store)));
        Self { store, ingest }
    }

    pub fn store(&self) -> Arc<AuditStore> {
        Arc::clone(&self.store)
    }

    pub fn ingest(&self) -> Arc<Ingestor> {
        Arc::clone(&self.ingest)
    }
}

pub async fn run(config: Config) -> Result<()> {
    config.ensure_data_dir()?;
    let store = Arc::new(AuditStore::open(config.data_dir.clone())?);
    let state = AppState::new(store);
    let app = router(state);

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
    let listener = TcpListener::bind(addr).await?;
    info!("Starting AuditDBX server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Unknown paths and wrong methods both answer 404, mirroring the
/// path-gated handlers this service replaces.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(ingest_events))
        .route("/get-logs", get(get_logs))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
}

#[derive(Serialize)]
struct IngestAck {
    batch: u64,
    received: usize,
}

/// Decodes the batch and schedules aggregation; the response never
/// waits for persistence. A body that fails to decode is rejected by
/// the extractor with a client error before anything is scheduled.
async fn ingest_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<AuditEvent>>,
) -> Json<IngestAck> {
    let received = events.len();
    let batch = state.ingest.submit(events);
    Json(IngestAck { batch, received })
}

/// Returns the entire store as commit hash to raw serialized group.
/// The whole mapping is materialized per request; record counts are
/// expected to stay small.
async fn get_logs(State(state): State<AppState>) -> Result<Json<BTreeMap<String, String>>> {
    let store = state.store();
    let records = tokio::task::spawn_blocking(move || store.snapshot())
        .await
        .map_err(|err| AuditError::Storage(format!("failed to scan store: {err}")))??;
    Ok(Json(records))
}

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to install shutdown signal handler: {err}");
    }
}
