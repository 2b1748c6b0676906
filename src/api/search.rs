// Search and transcript export (spec §4.5, §6).

use super::{ApiResult, AppState};
use crate::error::EngineError;
use crate::search::{self, captions, SearchMode, SearchQuery, SearchResult};
use crate::store::open_db;
use crate::store::schema;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(alias = "query")]
    text: String,
    library_id: Option<i64>,
    person_id: Option<i64>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

fn parse_mode(mode: Option<&str>) -> SearchMode {
    match mode {
        Some("transcript") => SearchMode::Transcript,
        Some("visual") => SearchMode::Visual,
        _ => SearchMode::Both,
    }
}

pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    let conn = open_db(&state.config.data_root)?;
    let query = SearchQuery {
        text: body.text,
        library_id: body.library_id,
        person_id: body.person_id,
        mode: parse_mode(body.mode.as_deref()),
        limit: body.limit.unwrap_or(0),
    };
    let results = search::search(&conn, &state.config, &state.models, &query)?;
    Ok(Json(results))
}

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_format")]
    format: String,
}

fn default_format() -> String {
    "srt".to_string()
}

pub async fn export_captions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<ExportQuery>,
) -> ApiResult<Response> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_item(&conn, id)?.ok_or(EngineError::ItemNotFound(id))?;

    let (body, content_type) = match q.format.as_str() {
        "vtt" => (captions::export_vtt(&conn, id)?, "text/vtt"),
        _ => (captions::export_srt(&conn, id)?, "application/x-subrip"),
    };

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
