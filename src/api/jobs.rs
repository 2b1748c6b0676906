// Job queue inspection and pipeline pause/resume/start controls (spec §6, §5).

use super::{ApiResult, AppState};
use crate::error::EngineError;
use crate::store::open_db;
use crate::store::schema::{self, Job};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct ListQuery {
    status: Option<String>,
}

pub async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult<Json<Vec<Job>>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(schema::list_jobs(&conn, q.status.as_deref())?))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Job>> {
    let conn = open_db(&state.config.data_root)?;
    let job = schema::get_job(&conn, id)?.ok_or(EngineError::JobNotFound(id))?;
    Ok(Json(job))
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
}

/// Resume the pipeline if paused and immediately enqueue every `QUEUED` item
/// with no active job, rather than waiting for the next auto-continuation
/// sweep tick.
pub async fn start(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.pipeline.resume();
    let conn = open_db(&state.config.data_root)?;
    for item in schema::list_items_by_status(&conn, &["QUEUED"])? {
        let _ = state.pipeline.enqueue_item(item.id);
    }
    Ok(Json(StatusResponse { status: "started" }))
}

pub async fn pause(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.pipeline.pause();
    Ok(Json(StatusResponse { status: "paused" }))
}

pub async fn resume(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.pipeline.resume();
    Ok(Json(StatusResponse { status: "resumed" }))
}

#[derive(Serialize)]
pub struct QueueStatus {
    paused: bool,
    queued_items: usize,
    running_jobs: usize,
    pending_jobs: usize,
    failed_items: usize,
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<QueueStatus>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(QueueStatus {
        paused: state.pipeline.is_paused(),
        queued_items: schema::list_items_by_status(&conn, &["QUEUED"])?.len(),
        running_jobs: schema::list_jobs(&conn, Some("running"))?.len(),
        pending_jobs: schema::list_jobs(&conn, Some("pending"))?.len(),
        failed_items: schema::list_items_by_status(&conn, &["FAILED"])?.len(),
    }))
}
