// `/models`, `/models/{name}/progress`, `/models/import` (spec §6): model
// presence and offline-pack import. Model weight *downloading* itself is an
// external collaborator (spec §1 Out of scope) — this surface only reports
// what's on disk under `models/` and lets an offline pack be dropped in.

use super::{ApiResult, AppState};
use crate::error::EngineError;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;

/// The model ids the pipeline's `ModelBundle` contract names (spec §1: each
/// ML family is an interchangeable module). A model is "present" once a
/// `models/<id>/` directory exists with at least one file in it — the same
/// shape an offline pack import produces.
const MODEL_IDS: [&str; 4] = ["transcriber", "visual_embedder", "object_detector", "face_detector"];

fn model_dir(models_root: &std::path::Path, name: &str) -> PathBuf {
    models_root.join(name)
}

fn is_present(models_root: &std::path::Path, name: &str) -> bool {
    let dir = model_dir(models_root, name);
    dir.is_dir() && std::fs::read_dir(&dir).map(|mut it| it.next().is_some()).unwrap_or(false)
}

#[derive(Serialize)]
pub struct ModelEntry {
    name: String,
    present: bool,
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<ModelEntry>>> {
    let models_dir = state.config.models_dir();
    let entries = MODEL_IDS
        .iter()
        .map(|&name| ModelEntry { name: name.to_string(), present: is_present(&models_dir, name) })
        .collect();
    Ok(Json(entries))
}

#[derive(Serialize)]
pub struct ProgressResponse {
    name: String,
    present: bool,
    /// Always 0 or 100: this engine never performs the download itself, so
    /// there's no partial-progress state to report beyond present/absent.
    percent: u32,
}

pub async fn progress(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<ProgressResponse>> {
    if !MODEL_IDS.contains(&name.as_str()) {
        return Err(EngineError::ModelMissing(name).into());
    }
    let present = is_present(&state.config.models_dir(), &name);
    Ok(Json(ProgressResponse { name, present, percent: if present { 100 } else { 0 } }))
}

#[derive(Serialize)]
pub struct ImportResponse {
    name: String,
    status: &'static str,
}

/// Import an offline model pack: a single uploaded file (e.g. a `.bin`/
/// `.onnx` weight file, or a zip a real backend would unpack) is written
/// into `models/<name>/`, making that model "present" without any network
/// access — the offline-first counterpart to a weight download.
pub async fn import(
    State(state): State<AppState>,
    Path(name): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportResponse>> {
    if !MODEL_IDS.contains(&name.as_str()) {
        return Err(EngineError::ModelMissing(name).into());
    }

    let dir = model_dir(&state.config.models_dir(), &name);
    std::fs::create_dir_all(&dir).map_err(EngineError::Io)?;

    while let Some(field) = multipart.next_field().await.map_err(|e| EngineError::Other(e.to_string()))? {
        let filename = field.file_name().unwrap_or("weights.bin").to_string();
        let data = field.bytes().await.map_err(|e| EngineError::Other(e.to_string()))?;
        std::fs::write(dir.join(sanitize_filename(&filename)), &data).map_err(EngineError::Io)?;
    }

    Ok(Json(ImportResponse { name, status: "imported" }))
}

/// Strip path separators so an uploaded filename can't write outside the
/// per-model import directory.
fn sanitize_filename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or("weights.bin").to_string()
}
