// `/settings` (spec §6): the enumerated store-level settings, loaded from
// and persisted to the `settings` KV table via `config::Settings`.

use super::{ApiResult, AppState};
use crate::config::Settings;
use crate::store::open_db;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(Settings::load(&conn)?))
}

/// Patch is a full-struct replace rather than a partial merge: the shell
/// always sends every field, since it always reads the full settings object
/// before rendering the preferences form.
#[derive(Deserialize)]
pub struct PatchSettingsRequest {
    #[serde(flatten)]
    settings: Settings,
}

pub async fn patch_settings(
    State(state): State<AppState>,
    Json(body): Json<PatchSettingsRequest>,
) -> ApiResult<Json<Settings>> {
    let conn = open_db(&state.config.data_root)?;
    body.settings.save(&conn)?;
    Ok(Json(Settings::load(&conn)?))
}
