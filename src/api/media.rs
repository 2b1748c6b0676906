// Item listing, detail, frames/metadata, and retry endpoints (spec §6).

use super::{ApiResult, AppState};
use crate::error::EngineError;
use crate::store::open_db;
use crate::store::schema::{self, Frame, Item};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Deserialize)]
pub struct ListQuery {
    library_id: Option<i64>,
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    crate::constants::DEFAULT_SEARCH_PAGE_SIZE
}

pub async fn list_flat(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult<Json<Vec<Item>>> {
    let conn = open_db(&state.config.data_root)?;
    let items = schema::list_items(&conn, q.library_id, q.status.as_deref(), q.limit, q.offset)?;
    Ok(Json(items))
}

#[derive(Serialize)]
pub struct MonthGroup {
    month: String,
    items: Vec<Item>,
}

/// Group items by the calendar month of their best-known date: EXIF/
/// container `creation_time` when present, else the filesystem `mtime`.
pub async fn list_grouped(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult<Json<Vec<MonthGroup>>> {
    let conn = open_db(&state.config.data_root)?;
    let items = schema::list_items(&conn, q.library_id, q.status.as_deref(), q.limit.max(10_000), q.offset)?;

    let mut groups: HashMap<String, Vec<Item>> = HashMap::new();
    for item in items {
        let date = item.creation_time.clone().unwrap_or_else(|| item.mtime.clone());
        let month = date.get(0..7).unwrap_or("unknown").to_string();
        groups.entry(month).or_default().push(item);
    }

    let mut result: Vec<MonthGroup> = groups.into_iter().map(|(month, items)| MonthGroup { month, items }).collect();
    result.sort_by(|a, b| b.month.cmp(&a.month));
    Ok(Json(result))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Item>> {
    let conn = open_db(&state.config.data_root)?;
    let item = schema::get_item(&conn, id)?.ok_or(EngineError::ItemNotFound(id))?;
    Ok(Json(item))
}

pub async fn frames(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Vec<Frame>>> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_item(&conn, id)?.ok_or(EngineError::ItemNotFound(id))?;
    Ok(Json(schema::list_frames(&conn, id)?))
}

#[derive(Serialize)]
pub struct MetadataResponse {
    item: Item,
    extra: Vec<(String, String)>,
}

pub async fn metadata(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<MetadataResponse>> {
    let conn = open_db(&state.config.data_root)?;
    let item = schema::get_item(&conn, id)?.ok_or(EngineError::ItemNotFound(id))?;
    let extra = schema::list_item_metadata(&conn, id)?;
    Ok(Json(MetadataResponse { item, extra }))
}

#[derive(Serialize)]
pub struct RetryResponse {
    status: &'static str,
}

/// Reset a failed item back to `QUEUED` from its last completed stage and
/// hand it straight to the pipeline, instead of waiting for the next sweep.
pub async fn retry_one(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<RetryResponse>> {
    let conn = open_db(&state.config.data_root)?;
    let item = schema::get_item(&conn, id)?.ok_or(EngineError::ItemNotFound(id))?;
    schema::reset_item_for_requeue(&conn, id, item.last_completed_stage.as_deref())?;
    state.pipeline.enqueue_item(id)?;
    Ok(Json(RetryResponse { status: "requeued" }))
}

#[derive(Serialize)]
pub struct RetryAllResponse {
    status: &'static str,
    requeued: usize,
}

pub async fn retry_all_failed(State(state): State<AppState>) -> ApiResult<Json<RetryAllResponse>> {
    let conn = open_db(&state.config.data_root)?;
    let failed = schema::list_items_by_status(&conn, &["FAILED"])?;
    for item in &failed {
        schema::reset_item_for_requeue(&conn, item.id, item.last_completed_stage.as_deref())?;
        state.pipeline.enqueue_item(item.id)?;
    }
    Ok(Json(RetryAllResponse { status: "requeued", requeued: failed.len() }))
}
