use crate::control::supervisor::{RunMode, RunSupervisor, StartOutcome};
use crate::core::run_state::{rewrite_status, RunState, RunStatus, StatusStore};
use crate::core::stop_signal::StopSignal;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const SERVICE_NAME: &str = "jobscout";

/// Everything the handlers share. The three seams are swappable for tests.
pub struct ControlState {
    pub supervisor: Arc<dyn RunSupervisor>,
    pub status: Arc<dyn StatusStore>,
    pub stop: Arc<dyn StopSignal>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("control: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

pub fn router(state: Arc<ControlState>, dashboard_dir: impl Into<PathBuf>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status.json", get(status_handler))
        .route("/stop", post(stop_handler))
        .route("/apply", post(apply_handler))
        .route("/search", post(search_handler))
        .fallback_service(ServeDir::new(dashboard_dir.into()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<ControlState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "run_alive": state.supervisor.is_alive().await,
    }))
}

async fn status_handler(
    State(state): State<Arc<ControlState>>,
) -> Result<Json<RunState>, ApiError> {
    if state.supervisor.reap().await {
        info!("control: run process has exited, status back to Ready");
        if let Err(e) = rewrite_status(state.status.as_ref(), RunStatus::Ready) {
            warn!("control: could not reset status: {}", e);
        }
    }
    let current = state.status.load().map_err(internal)?.unwrap_or_default();
    Ok(Json(current))
}

async fn stop_handler(State(state): State<Arc<ControlState>>) -> Result<Json<Value>, ApiError> {
    info!("control: stop requested");
    state.stop.request();
    let outcome = state.supervisor.stop().await;
    info!("control: run stopped ({:?})", outcome);
    state.stop.clear();
    rewrite_status(state.status.as_ref(), RunStatus::Ready).map_err(internal)?;
    Ok(Json(json!({"status": "stopped"})))
}

async fn apply_handler(State(state): State<Arc<ControlState>>) -> Json<Value> {
    start_run(state, RunMode::Apply).await
}

async fn search_handler(State(state): State<Arc<ControlState>>) -> Json<Value> {
    start_run(state, RunMode::Search).await
}

async fn start_run(state: Arc<ControlState>, mode: RunMode) -> Json<Value> {
    if state.supervisor.is_alive().await {
        info!("control: {} requested while a run is alive", mode);
        return Json(json!({"status": "already_running"}));
    }

    tokio::spawn(async move {
        if let Err(e) = rewrite_status(state.status.as_ref(), RunStatus::Running) {
            warn!("control: could not mark status Running: {}", e);
        }
        match state.supervisor.start(mode).await {
            Ok(StartOutcome::Started(pid)) => info!("control: {} run spawned (pid {:?})", mode, pid),
            Ok(StartOutcome::AlreadyRunning) => info!("control: {} run raced an existing run", mode),
            Err(e) => {
                error!("control: {} run failed to start: {}", mode, e);
                if let Err(e) = rewrite_status(state.status.as_ref(), RunStatus::Ready) {
                    warn!("control: could not reset status: {}", e);
                }
            }
        }
    });

    Json(json!({"status": "started"}))
}
