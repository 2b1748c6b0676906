// `/network/status`, `/network/privacy-report` (spec §6): surfaces the
// outbound request ledger `network::status`/`network::privacy_report` read
// out of the store, so a user can confirm offline mode's zero-egress
// guarantee (Testable Property 6) for themselves.

use super::{ApiResult, AppState};
use crate::config::Settings;
use crate::network;
use crate::store::open_db;
use axum::extract::State;
use axum::Json;

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<network::NetworkStatus>> {
    let conn = open_db(&state.config.data_root)?;
    let settings = Settings::load(&conn)?;
    Ok(Json(network::status(&conn, &settings)?))
}

pub async fn privacy_report(State(state): State<AppState>) -> ApiResult<Json<Vec<network::PrivacyReportEntry>>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(network::privacy_report(&conn)?))
}
