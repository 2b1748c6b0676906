// API Surface (spec §6): stateless HTTP handlers plus the event stream,
// sitting above the other components. Every handler opens its own
// connection via `store::open_db`, the same pattern the pipeline and
// scanner use — SQLite in WAL mode makes that cheap and safe across
// concurrent requests.

pub mod assets;
pub mod auth;
pub mod backup;
pub mod error;
pub mod events;
pub mod faces;
pub mod favorites;
pub mod health;
pub mod jobs;
pub mod libraries;
pub mod maintenance;
pub mod media;
pub mod models;
pub mod network;
pub mod search;
pub mod settings;

use crate::config::Config;
use crate::pipeline::events::EventBus;
use crate::pipeline::ml::ModelBundle;
use crate::pipeline::PipelineManager;
use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

/// Shared handler state. Cloned per request (everything inside is an `Arc`
/// or otherwise cheap to clone); the database connection is deliberately
/// *not* part of it; each handler opens one, mirroring every other module.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub token: String,
    pub engine_uuid: String,
    pub dev_origin: Option<String>,
    pub started_at: Instant,
    pub pipeline: Arc<PipelineManager>,
    pub models: Arc<ModelBundle>,
    pub events: EventBus,
    pub shutdown_tx: tokio::sync::watch::Sender<bool>,
}

/// Assemble the full router. `/health` and `/events` are reachable without
/// a bearer token (the event stream authenticates itself via subprotocol or
/// query-string token, per spec §6); every other route sits behind
/// [`auth::auth_middleware`].
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/events", get(events::events_ws));

    let protected = Router::new()
        .route("/libraries", get(libraries::list).post(libraries::create))
        .route(
            "/libraries/:id",
            get(libraries::get_one).patch(libraries::rename).delete(libraries::remove),
        )
        .route("/libraries/:id/scan", post(libraries::scan))
        .route("/videos", get(media::list_flat))
        .route("/media", get(media::list_flat))
        .route("/media/grouped", get(media::list_grouped))
        .route("/videos/:id", get(media::get_one))
        .route("/videos/:id/frames", get(media::frames))
        .route("/videos/:id/metadata", get(media::metadata))
        .route("/videos/:id/retry", post(media::retry_one))
        .route("/videos/retry-failed/all", post(media::retry_all_failed))
        .route("/search", post(search::search))
        .route("/search/export/captions/:id", get(search::export_captions))
        .route("/jobs", get(jobs::list))
        .route("/jobs/:id", get(jobs::get_one))
        .route("/jobs/start", post(jobs::start))
        .route("/jobs/pause", post(jobs::pause))
        .route("/jobs/resume", post(jobs::resume))
        .route("/jobs/status", get(jobs::status))
        .route("/faces", get(faces::list))
        .route("/faces/:id", get(faces::get_one))
        .route("/faces/:id/assign", post(faces::assign))
        .route("/faces/:id/mark-reference", post(faces::mark_reference))
        .route("/faces/cluster", post(faces::cluster))
        .route("/faces/merge", post(faces::merge))
        .route("/faces/stats", get(faces::stats))
        .route("/faces/review-queue", get(faces::review_queue))
        .route("/faces/confusing-pairs", get(faces::confusing_pairs))
        .route("/faces/persons", get(faces::list_persons).post(faces::create_person))
        .route("/faces/persons/:id/timeline", get(faces::person_timeline))
        .route("/faces/persons/:id/recognition-mode", patch(faces::set_recognition_mode))
        .route("/models", get(models::list))
        .route("/models/:name/progress", get(models::progress))
        .route("/models/:name/import", post(models::import))
        .route("/settings", get(settings::get_settings).patch(settings::patch_settings))
        .route("/favorites/:kind", get(favorites::list))
        .route("/favorites/:kind/:id", post(favorites::add).delete(favorites::remove))
        .route("/favorites/tags/:item_id", get(favorites::list_tags).post(favorites::add_tag))
        .route("/favorites/tags/:item_id/:tag", axum::routing::delete(favorites::remove_tag))
        .route("/backup/export", post(backup::export))
        .route("/backup/restore", post(backup::restore))
        .route("/maintenance/wipe-derived", post(maintenance::wipe_derived))
        .route("/maintenance/wipe-faces", post(maintenance::wipe_faces))
        .route("/network/status", get(network::status))
        .route("/network/privacy-report", get(network::privacy_report))
        .route("/assets/thumbnail", get(assets::thumbnail))
        .route("/assets/face", get(assets::face))
        .route("/assets/video", get(assets::video))
        .route("/shutdown", post(health::shutdown))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let dev_origin = state.dev_origin.clone();
    CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin.as_bytes() == crate::constants::SHELL_ORIGIN.as_bytes()
                || dev_origin.as_deref().map(|o| o.as_bytes() == origin.as_bytes()).unwrap_or(false)
        }))
}
