// Face + person management (spec §6, §4.6): correction endpoints call
// straight into `faces::{assign_to_person, mark_reference, merge_persons,
// create_person}`; everything else is a read over the face/person tables.

use super::{ApiResult, AppState};
use crate::constants::FACE_REVIEW_QUEUE_THRESHOLD;
use crate::error::EngineError;
use crate::faces;
use crate::store::open_db;
use crate::store::schema::{self, Face, Person};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct ListFacesQuery {
    item_id: Option<i64>,
}

pub async fn list(State(state): State<AppState>, Query(q): Query<ListFacesQuery>) -> ApiResult<Json<Vec<Face>>> {
    let conn = open_db(&state.config.data_root)?;
    let faces = match q.item_id {
        Some(item_id) => schema::list_faces(&conn, item_id)?,
        None => schema::list_unassigned_faces(&conn)?,
    };
    Ok(Json(faces))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Face>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(schema::get_face(&conn, id)?.ok_or(EngineError::FaceNotFound(id))?))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    person_id: i64,
}

pub async fn assign(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<Json<Face>> {
    let conn = open_db(&state.config.data_root)?;
    faces::assign_to_person(&conn, id, body.person_id)?;
    recompute_thumbnail_if_needed(&conn, body.person_id)?;
    Ok(Json(schema::get_face(&conn, id)?.ok_or(EngineError::FaceNotFound(id))?))
}

pub async fn mark_reference(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<Json<Face>> {
    let conn = open_db(&state.config.data_root)?;
    faces::mark_reference(&conn, id, body.person_id)?;
    recompute_thumbnail_if_needed(&conn, body.person_id)?;
    Ok(Json(schema::get_face(&conn, id)?.ok_or(EngineError::FaceNotFound(id))?))
}

/// Recompute a person's thumbnail to the face closest to their updated
/// centroid, preferring non-null crops (spec §4.6 thumbnail selection).
fn recompute_thumbnail_if_needed(conn: &rusqlite::Connection, person_id: i64) -> crate::error::Result<()> {
    let Some(person) = schema::get_person(conn, person_id)? else {
        return Ok(());
    };
    let Some(centroid) = faces::person_centroid(conn, &person)? else {
        return Ok(());
    };
    let best = schema::list_faces_for_person(conn, person_id)?
        .into_iter()
        .filter(|f| f.crop_path.is_some() && !f.embedding.is_empty())
        .max_by(|a, b| {
            let sim_a = crate::store::vector_shard::cosine_similarity(&a.embedding, &centroid);
            let sim_b = crate::store::vector_shard::cosine_similarity(&b.embedding, &centroid);
            sim_a.partial_cmp(&sim_b).unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(face) = best {
        schema::set_person_thumbnail(conn, person_id, Some(face.id))?;
    }
    Ok(())
}

#[derive(Serialize)]
pub struct ClusterResponse {
    clustered: usize,
}

pub async fn cluster(State(state): State<AppState>) -> ApiResult<Json<ClusterResponse>> {
    let conn = open_db(&state.config.data_root)?;
    let clustered = faces::cluster::recluster_unassigned(&conn)?;
    Ok(Json(ClusterResponse { clustered }))
}

#[derive(Deserialize)]
pub struct MergeRequest {
    from: i64,
    to: i64,
}

pub async fn merge(State(state): State<AppState>, Json(body): Json<MergeRequest>) -> ApiResult<Json<Person>> {
    let conn = open_db(&state.config.data_root)?;
    faces::merge_persons(&conn, body.from, body.to)?;
    Ok(Json(schema::get_person(&conn, body.to)?.ok_or(EngineError::PersonNotFound(body.to))?))
}

#[derive(Serialize)]
pub struct FaceStats {
    total_faces: usize,
    assigned_faces: usize,
    unassigned_faces: usize,
    persons: usize,
    review_queue_size: usize,
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<FaceStats>> {
    let conn = open_db(&state.config.data_root)?;
    let persons = schema::list_persons(&conn)?;
    let unassigned = schema::list_unassigned_faces(&conn)?;
    let assigned: usize = persons.iter().map(|p| p.face_count as usize).sum();
    let review = schema::list_faces_for_review(&conn, FACE_REVIEW_QUEUE_THRESHOLD as f64)?;
    Ok(Json(FaceStats {
        total_faces: assigned + unassigned.len(),
        assigned_faces: assigned,
        unassigned_faces: unassigned.len(),
        persons: persons.len(),
        review_queue_size: review.len(),
    }))
}

pub async fn review_queue(State(state): State<AppState>) -> ApiResult<Json<Vec<Face>>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(schema::list_faces_for_review(&conn, FACE_REVIEW_QUEUE_THRESHOLD as f64)?))
}

#[derive(Serialize)]
pub struct ConfusingPair {
    person_a: i64,
    person_b: i64,
    threshold: f64,
}

/// Person pairs the recognizer has been corrected into treating as
/// confusable — any pair whose threshold has been bumped above the floor.
pub async fn confusing_pairs(State(state): State<AppState>) -> ApiResult<Json<Vec<ConfusingPair>>> {
    let conn = open_db(&state.config.data_root)?;
    let pairs = schema::list_pair_thresholds(&conn)?
        .into_iter()
        .map(|(a, b, threshold)| ConfusingPair { person_a: a, person_b: b, threshold })
        .collect();
    Ok(Json(pairs))
}

pub async fn list_persons(State(state): State<AppState>) -> ApiResult<Json<Vec<Person>>> {
    let conn = open_db(&state.config.data_root)?;
    Ok(Json(schema::list_persons(&conn)?))
}

#[derive(Deserialize)]
pub struct CreatePersonRequest {
    name: String,
    /// Optional initial face set (spec §4.6 "create person from face set").
    #[serde(default)]
    face_ids: Vec<i64>,
}

pub async fn create_person(
    State(state): State<AppState>,
    Json(body): Json<CreatePersonRequest>,
) -> ApiResult<Json<Person>> {
    let conn = open_db(&state.config.data_root)?;
    let person_id = faces::create_person(&conn, &body.name)?;
    for face_id in &body.face_ids {
        faces::assign_to_person(&conn, *face_id, person_id)?;
    }
    recompute_thumbnail_if_needed(&conn, person_id)?;
    Ok(Json(schema::get_person(&conn, person_id)?.ok_or(EngineError::PersonNotFound(person_id))?))
}

#[derive(Serialize)]
pub struct TimelineEntry {
    item_id: i64,
    timestamp_ms: i64,
    face_id: i64,
}

pub async fn person_timeline(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Vec<TimelineEntry>>> {
    let conn = open_db(&state.config.data_root)?;
    schema::get_person(&conn, id)?.ok_or(EngineError::PersonNotFound(id))?;
    let mut entries: Vec<TimelineEntry> = schema::list_faces_for_person(&conn, id)?
        .into_iter()
        .map(|f| TimelineEntry { item_id: f.item_id, timestamp_ms: f.timestamp_ms, face_id: f.id })
        .collect();
    entries.sort_by_key(|e| (e.item_id, e.timestamp_ms));
    Ok(Json(entries))
}

#[derive(Deserialize)]
pub struct RecognitionModeRequest {
    recognition_mode: String,
}

pub async fn set_recognition_mode(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RecognitionModeRequest>,
) -> ApiResult<Json<Person>> {
    if !["average", "reference_only", "weighted"].contains(&body.recognition_mode.as_str()) {
        return Err(EngineError::InvalidPath(format!("unknown recognition_mode: {}", body.recognition_mode)).into());
    }
    let conn = open_db(&state.config.data_root)?;
    schema::get_person(&conn, id)?.ok_or(EngineError::PersonNotFound(id))?;
    schema::set_person_recognition_mode(&conn, id, &body.recognition_mode)?;
    Ok(Json(schema::get_person(&conn, id)?.ok_or(EngineError::PersonNotFound(id))?))
}
