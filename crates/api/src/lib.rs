//! Station Temperature API Server
//!
//! HTTP/JSON RPC surface for recording readings and querying station maxima.
//! Storage faults come back inside the reply body; transport errors are
//! reserved for requests that cannot be decoded.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use station_service::StationService;
use storage::{
    ConsistencyLevel, MemoryCluster, StationStore, StorageFault, READ_CONSISTENCY, WRITE_CONSISTENCY,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
mod routes;

use crate::config::{AppConfig, LoggingConfig};

/// Application state shared across handlers
pub struct AppState {
    /// Station operations
    pub service: StationService,
    /// Replicated store behind the service
    pub cluster: Arc<MemoryCluster>,
    /// Prometheus exporter, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire the cluster, prepared statements and service from configuration
    ///
    /// Storage is the in-process `MemoryCluster`: contact points name its
    /// replica nodes and readings do not survive a restart.
    pub async fn build(config: &AppConfig) -> Result<Self, StorageFault> {
        let cluster = Arc::new(MemoryCluster::new(
            &config.storage.keyspace,
            config.storage.contact_points.iter().cloned(),
        ));

        let mut store = StationStore::prepare(cluster.clone(), &config.storage.keyspace).await?;
        if config.storage.request_timeout_ms > 0 {
            store = store.with_request_timeout(Duration::from_millis(config.storage.request_timeout_ms));
        }

        Ok(Self::new(StationService::new(Arc::new(store)), cluster))
    }

    pub fn new(service: StationService, cluster: Arc<MemoryCluster>) -> Self {
        Self {
            service,
            cluster,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cluster: ClusterHealth,
}

/// Replica view of the store
#[derive(Debug, Serialize)]
pub struct ClusterHealth {
    pub replication_factor: usize,
    pub alive_nodes: usize,
    pub nodes: Vec<NodeHealth>,
    pub write_consistency: ConsistencyLevel,
    pub read_consistency: ConsistencyLevel,
    /// Enough replicas up for writes
    pub writable: bool,
    /// Enough replicas up for maximum queries
    pub readable: bool,
}

/// Individual node health
#[derive(Debug, Serialize)]
pub struct NodeHealth {
    pub name: String,
    pub up: bool,
}

/// Create the application router
///
/// At most `workers` requests are served at once across all routes.
pub fn create_router(state: Arc<AppState>, workers: usize) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/stations/record", post(routes::stations::record_temps))
        .route("/api/v1/stations/max", post(routes::stations::station_max))
        .route("/metrics", get(metrics_handler))
        .layer(GlobalConcurrencyLimitLayer::new(workers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cluster = &state.cluster;
    let rf = cluster.replication_factor();
    let alive = cluster.alive_nodes();
    let writable = alive >= WRITE_CONSISTENCY.required_replicas(rf);
    let readable = alive >= READ_CONSISTENCY.required_replicas(rf);

    let status = match (readable, writable) {
        (true, _) => "healthy",
        (false, true) => "degraded",
        (false, false) => "unavailable",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cluster: ClusterHealth {
            replication_factor: rf,
            alive_nodes: alive,
            nodes: cluster
                .node_status()
                .into_iter()
                .map(|(name, up)| NodeHealth { name, up })
                .collect(),
            write_consistency: WRITE_CONSISTENCY,
            read_consistency: READ_CONSISTENCY,
            writable,
            readable,
        },
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level: Level = config.level.parse().unwrap_or(Level::INFO);

    if config.json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Run the server until Ctrl-C
pub async fn run_server(config: AppConfig, metrics: Option<PrometheusHandle>) -> anyhow::Result<()> {
    let mut state = AppState::build(&config).await?;
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let app = create_router(Arc::new(state), config.server.workers);

    info!(
        "Starting station server on {} ({} workers, contact points {:?})",
        config.server.listen_addr, config.server.workers, config.storage.contact_points
    );

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Station server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
