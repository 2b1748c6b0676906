// `/backup/export`, `/backup/restore` (spec §6): a metadata-only backup —
// library registrations, person identities, pair thresholds, favorites, and
// tags — tagged with `schema_version` so a restore can refuse a backup from
// an incompatible schema. Derived data (transcripts, frames, detections,
// faces) is deliberately excluded: it is rebuilt by the pipeline on rescan,
// not restored (spec §8 scenario 6).
//
// Face references/negatives are not included: they key off `Face.id`, which
// does not survive a derived-data wipe (faces cascade-delete their
// `face_examples` rows), so there is nothing stable to restore them by. See
// DESIGN.md for this call.

use super::{ApiResult, AppState};
use crate::error::EngineError;
use crate::store::schema::{self, Library};
use crate::store::{migrations, open_db};
use axum::extract::State;
use axum::Json;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupData {
    pub schema_version: u32,
    pub libraries: Vec<Library>,
    pub persons: Vec<PersonRecord>,
    pub pair_thresholds: Vec<(i64, i64, f64)>,
    pub favorites: Vec<(String, i64)>,
    pub tags: Vec<(i64, String)>,
    pub settings: Vec<(String, String)>,
}

/// The subset of `Person` that is genuine user input rather than derived
/// from faces (`face_count` and `thumbnail_face_id` are recomputed once
/// faces exist again).
#[derive(Debug, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: i64,
    pub name: String,
    pub recognition_mode: String,
}

pub async fn export(State(state): State<AppState>) -> ApiResult<Json<BackupData>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(build_backup(&conn)?))
}

fn build_backup(conn: &Connection) -> crate::error::Result<BackupData> {
    let persons = schema::list_persons(conn)?
        .into_iter()
        .map(|p| PersonRecord { id: p.id, name: p.name, recognition_mode: p.recognition_mode })
        .collect();

    let mut favorites = Vec::new();
    for kind in ["item", "person"] {
        for target_id in schema::list_favorites(conn, kind)? {
            favorites.push((kind.to_string(), target_id));
        }
    }

    Ok(BackupData {
        schema_version: migrations::schema_version(conn)?,
        libraries: schema::list_libraries(conn)?,
        persons,
        pair_thresholds: schema::list_pair_thresholds(conn)?,
        favorites,
        tags: schema::list_all_item_tags(conn)?,
        settings: schema::list_settings(conn)?,
    })
}

#[derive(Serialize)]
pub struct RestoreResponse {
    status: &'static str,
    libraries_restored: usize,
    persons_restored: usize,
}

/// Idempotent upsert keyed by primary key: a restore onto the same store it
/// was exported from (the only scenario this is specified for — no
/// cross-device sync per spec §1 Non-goals) reproduces identical rows
/// modulo `updated_at` timestamps (Testable Property "round-trip").
pub async fn restore(State(state): State<AppState>, Json(body): Json<BackupData>) -> ApiResult<Json<RestoreResponse>> {
    let conn = open_db(&state.config.data_root)?;
    let current_version = migrations::schema_version(&conn)?;
    if body.schema_version > current_version {
        return Err(EngineError::Other(format!(
            "backup schema_version {} is newer than this engine's {}",
            body.schema_version, current_version
        ))
        .into());
    }

    for library in &body.libraries {
        conn.execute(
            "INSERT INTO libraries (id, path, name, recursive) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET path = excluded.path, name = excluded.name, recursive = excluded.recursive",
            params![library.id, library.path, library.name, library.recursive as i64],
        )?;
    }

    for person in &body.persons {
        conn.execute(
            "INSERT INTO persons (id, name, recognition_mode) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, recognition_mode = excluded.recognition_mode",
            params![person.id, person.name, person.recognition_mode],
        )?;
    }

    for (person_a, person_b, threshold) in &body.pair_thresholds {
        conn.execute(
            "INSERT INTO pair_thresholds (person_a, person_b, threshold) VALUES (?1, ?2, ?3)
             ON CONFLICT(person_a, person_b) DO UPDATE SET threshold = excluded.threshold",
            params![person_a, person_b, threshold],
        )?;
    }

    for (kind, target_id) in &body.favorites {
        schema::set_favorite(&conn, kind, *target_id, true)?;
    }

    for (item_id, tag) in &body.tags {
        if schema::item_exists(&conn, *item_id)? {
            schema::tag_item(&conn, *item_id, tag)?;
        }
    }

    for (key, value) in &body.settings {
        schema::set_setting(&conn, key, value)?;
    }

    Ok(Json(RestoreResponse {
        status: "restored",
        libraries_restored: body.libraries.len(),
        persons_restored: body.persons.len(),
    }))
}
