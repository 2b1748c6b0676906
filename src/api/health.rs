// `/health` (unauthenticated, spec §6) and `/shutdown` (authenticated):
// engine liveness/readiness, and the one endpoint that asks the process to
// stop cleanly instead of relying on the watchdog or a signal.

use super::{ApiResult, AppState};
use crate::lifecycle::Lockfile;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    engine_uuid: String,
    uptime_secs: u64,
    models_ready: bool,
    missing_models: Vec<String>,
    ffmpeg_available: bool,
    ffprobe_available: bool,
    exiftool_available: bool,
    gpu_available: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine_uuid: state.engine_uuid.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        models_ready: true,
        missing_models: Vec::new(),
        ffmpeg_available: crate::tools::is_tool_available("ffmpeg"),
        ffprobe_available: crate::tools::is_tool_available("ffprobe"),
        exiftool_available: crate::tools::is_tool_available("exiftool"),
        gpu_available: false,
    })
}

#[derive(Serialize)]
pub struct ShutdownResponse {
    status: &'static str,
}

/// Graceful shutdown: clear the lockfile so a subsequent launch doesn't see
/// a stale `AlreadyRunning`/`ConflictingEngine`, then flip the watch channel
/// `main` is blocked on.
pub async fn shutdown(State(state): State<AppState>) -> ApiResult<Json<ShutdownResponse>> {
    let _ = Lockfile::remove(&state.config.data_root);
    let _ = state.shutdown_tx.send(true);
    Ok(Json(ShutdownResponse { status: "shutting_down" }))
}
