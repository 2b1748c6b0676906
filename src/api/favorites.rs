// `/favorites/*` (spec §6): favorites over items/persons, and item tags.
// `kind` distinguishes the two favorite target tables (`item` | `person`)
// sharing one `favorites` row shape (spec §3 "User Metadata").

use super::{ApiResult, AppState};
use crate::error::EngineError;
use crate::store::open_db;
use crate::store::schema;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

fn validate_kind(kind: &str) -> ApiResult<()> {
    match kind {
        "item" | "person" => Ok(()),
        other => Err(EngineError::InvalidPath(format!("unknown favorite kind: {}", other)).into()),
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
}

pub async fn list(State(state): State<AppState>, Path(kind): Path<String>) -> ApiResult<Json<Vec<i64>>> {
    validate_kind(&kind)?;
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(schema::list_favorites(&conn, &kind)?))
}

pub async fn add(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Json<StatusResponse>> {
    validate_kind(&kind)?;
    let conn = open_db(&state.config.data_root)?;
    schema::set_favorite(&conn, &kind, id, true)?;
    Ok(Json(StatusResponse { status: "added" }))
}

pub async fn remove(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Json<StatusResponse>> {
    validate_kind(&kind)?;
    let conn = open_db(&state.config.data_root)?;
    schema::set_favorite(&conn, &kind, id, false)?;
    Ok(Json(StatusResponse { status: "removed" }))
}

pub async fn list_tags(State(state): State<AppState>, Path(item_id): Path<i64>) -> ApiResult<Json<Vec<String>>> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_item(&conn, item_id)?.ok_or(EngineError::ItemNotFound(item_id))?;
    Ok(Json(schema::list_item_tags(&conn, item_id)?))
}

#[derive(serde::Deserialize)]
pub struct AddTagRequest {
    tag: String,
}

pub async fn add_tag(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Json(body): Json<AddTagRequest>,
) -> ApiResult<Json<Vec<String>>> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_item(&conn, item_id)?.ok_or(EngineError::ItemNotFound(item_id))?;
    schema::tag_item(&conn, item_id, &body.tag)?;
    Ok(Json(schema::list_item_tags(&conn, item_id)?))
}

pub async fn remove_tag(
    State(state): State<AppState>,
    Path((item_id, tag)): Path<(i64, String)>,
) -> ApiResult<Json<Vec<String>>> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_item(&conn, item_id)?.ok_or(EngineError::ItemNotFound(item_id))?;
    schema::untag_item(&conn, item_id, &tag)?;
    Ok(Json(schema::list_item_tags(&conn, item_id)?))
}
