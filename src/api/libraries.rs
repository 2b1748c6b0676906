// Library CRUD and the scan trigger (spec §6, §4.3).

use super::{ApiResult, AppState};
use crate::error::EngineError;
use crate::store::schema::{self, Library};
use crate::store::open_db;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Library>>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(schema::list_libraries(&conn)?))
}

#[derive(Deserialize)]
pub struct CreateLibraryRequest {
    path: String,
    name: Option<String>,
    #[serde(default = "default_recursive")]
    recursive: bool,
}

fn default_recursive() -> bool {
    true
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateLibraryRequest>,
) -> ApiResult<Json<Library>> {
    let path = std::path::Path::new(&body.path);
    if !path.is_dir() {
        return Err(EngineError::InvalidPath(body.path).into());
    }

    let conn = open_db(&state.config.data_root)?;
    let name = body.name.unwrap_or_else(|| {
        path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| body.path.clone())
    });
    let id = schema::insert_library(&conn, &body.path, &name, body.recursive)?;
    let library = schema::get_library(&conn, id)?.ok_or(EngineError::LibraryNotFound(id))?;
    Ok(Json(library))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Library>> {
    let conn = open_db(&state.config.data_root)?;
    let library = schema::get_library(&conn, id)?.ok_or(EngineError::LibraryNotFound(id))?;
    Ok(Json(library))
}

#[derive(Deserialize)]
pub struct RenameLibraryRequest {
    name: String,
}

pub async fn rename(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RenameLibraryRequest>,
) -> ApiResult<Json<Library>> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_library(&conn, id)?.ok_or(EngineError::LibraryNotFound(id))?;
    schema::rename_library(&conn, id, &body.name)?;
    let library = schema::get_library(&conn, id)?.ok_or(EngineError::LibraryNotFound(id))?;
    Ok(Json(library))
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<StatusResponse>> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_library(&conn, id)?.ok_or(EngineError::LibraryNotFound(id))?;
    schema::delete_library(&conn, id)?;
    Ok(Json(StatusResponse { status: "deleted" }))
}

/// Walk the library for new/changed/renamed/deleted files, publish the
/// resulting `scan_progress` event, and immediately enqueue every file the
/// scan just discovered rather than waiting for the next auto-continuation
/// sweep tick.
pub async fn scan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<crate::scanner::ScanReport>> {
    let data_root = state.config.data_root.clone();
    let pipeline = state.pipeline.clone();
    let events = state.events.clone();

    let report = tokio::task::spawn_blocking(move || -> crate::error::Result<crate::scanner::ScanReport> {
        let conn = open_db(&data_root)?;
        let library = schema::get_library(&conn, id)?.ok_or(EngineError::LibraryNotFound(id))?;
        let report = crate::scanner::scan_library(&conn, &library)?;

        events.publish(crate::pipeline::events::EngineEvent::ScanProgress {
            library_id: report.library_id,
            files_found: report.files_found,
            files_new: report.files_new,
            files_changed: report.files_changed,
            files_deleted: report.files_deleted,
        });

        for item in schema::list_items_by_status(&conn, &["QUEUED"])? {
            if item.library_id == id {
                let _ = pipeline.enqueue_item(item.id);
            }
        }

        Ok(report)
    })
    .await
    .map_err(|e| EngineError::Other(e.to_string()))??;

    Ok(Json(report))
}
