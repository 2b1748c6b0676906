// `/maintenance/wipe-derived`, `/maintenance/wipe-faces` (spec §6): reset
// derived data while keeping the library registrations and user metadata
// that drove it, so a rescan can rebuild everything from scratch (spec §8
// scenario 6, offline backup round-trip).

use super::{ApiResult, AppState};
use crate::store::open_db;
use crate::store::schema;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct WipeResponse {
    status: &'static str,
    items_requeued: usize,
}

/// Reset every item back to `QUEUED` and drop its derived rows/artifacts
/// (transcripts, frames, detections, faces, shards, thumbnails), but leave
/// the item row, its library membership, and any favorites/tags on it
/// intact — those are user metadata, not pipeline output.
pub async fn wipe_derived(State(state): State<AppState>) -> ApiResult<Json<WipeResponse>> {
    let conn = open_db(&state.config.data_root)?;
    let items = schema::list_items(&conn, None, None, i64::MAX, 0)?;

    for item in &items {
        schema::delete_transcript_segments(&conn, item.id)?;
        schema::set_item_transcript(&conn, item.id, "")?;
        crate::store::vector_shard::delete_shard(&state.config.shards_dir(), item.id)?;
        for face in schema::list_faces(&conn, item.id)? {
            if let Some(path) = face.crop_path {
                let _ = std::fs::remove_file(path);
            }
        }
        for frame in schema::list_frames(&conn, item.id)? {
            if let Some(path) = frame.thumbnail_path {
                let _ = std::fs::remove_file(path);
            }
        }
        conn.execute("DELETE FROM faces WHERE item_id = ?1", rusqlite::params![item.id])?;
        conn.execute("DELETE FROM detections WHERE item_id = ?1", rusqlite::params![item.id])?;
        conn.execute("DELETE FROM frames WHERE item_id = ?1", rusqlite::params![item.id])?;
        schema::reset_item_for_requeue(&conn, item.id, None)?;
    }
    for person in schema::list_persons(&conn)? {
        schema::recompute_person_face_count(&conn, person.id)?;
        schema::set_person_thumbnail(&conn, person.id, None)?;
    }

    Ok(Json(WipeResponse { status: "wiped", items_requeued: items.len() }))
}

/// Wipe only face data: every `Face` row and crop file, every `Person`, and
/// every reference/negative/pair-threshold record. Transcripts, frames, and
/// detections are untouched, so this doesn't require a rescan — the next
/// `DETECTING_FACES` pass on affected items reruns on existing frames.
pub async fn wipe_faces(State(state): State<AppState>) -> ApiResult<Json<WipeResponse>> {
    let conn = open_db(&state.config.data_root)?;
    let items = schema::list_items(&conn, None, None, i64::MAX, 0)?;

    let mut wiped = 0;
    for item in &items {
        let faces = schema::list_faces(&conn, item.id)?;
        if faces.is_empty() {
            continue;
        }
        for face in &faces {
            if let Some(path) = &face.crop_path {
                let _ = std::fs::remove_file(path);
            }
        }
        conn.execute("DELETE FROM faces WHERE item_id = ?1", rusqlite::params![item.id])?;
        wiped += 1;
    }
    conn.execute("DELETE FROM persons", [])?;
    conn.execute("DELETE FROM face_examples", [])?;
    conn.execute("DELETE FROM pair_thresholds", [])?;

    Ok(Json(WipeResponse { status: "wiped", items_requeued: wiped }))
}
