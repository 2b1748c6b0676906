// Typed repository operations: one insert/get/list/update function set per
// entity, following a flat query-per-function style rather than an ORM.

use crate::error::{EngineError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ----- Library -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub recursive: bool,
    pub created_at: String,
}

fn row_to_library(row: &rusqlite::Row) -> rusqlite::Result<Library> {
    Ok(Library {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        recursive: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
    })
}

const LIBRARY_COLUMNS: &str = "id, path, name, recursive, created_at";

pub fn insert_library(conn: &Connection, path: &str, name: &str, recursive: bool) -> Result<i64> {
    crate::store::with_retry(|| {
        conn.execute(
            "INSERT INTO libraries (path, name, recursive) VALUES (?1, ?2, ?3)",
            params![path, name, recursive as i64],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn get_library(conn: &Connection, id: i64) -> Result<Option<Library>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM libraries WHERE id = ?1", LIBRARY_COLUMNS),
            params![id],
            row_to_library,
        )
        .optional()?)
}

pub fn get_library_by_path(conn: &Connection, path: &str) -> Result<Option<Library>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM libraries WHERE path = ?1", LIBRARY_COLUMNS),
            params![path],
            row_to_library,
        )
        .optional()?)
}

pub fn list_libraries(conn: &Connection) -> Result<Vec<Library>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM libraries ORDER BY id", LIBRARY_COLUMNS))?;
    let rows = stmt.query_map([], row_to_library)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn rename_library(conn: &Connection, id: i64, name: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("UPDATE libraries SET name = ?1 WHERE id = ?2", params![name, id])?;
        Ok(())
    })
}

pub fn delete_library(conn: &Connection, id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("DELETE FROM libraries WHERE id = ?1", params![id])?;
        Ok(())
    })
}

// ----- Item -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub library_id: i64,
    pub path: String,
    pub filename: String,
    pub size: i64,
    pub mtime: String,
    pub fingerprint: String,
    pub media_type: String,
    pub status: String,
    pub last_completed_stage: Option<String>,
    pub progress: f64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub audio_codec: Option<String>,
    pub container: Option<String>,
    pub creation_time: Option<String>,
    pub creation_time_source: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub is_live_component: bool,
    pub live_pair_id: Option<i64>,
    pub transcript: Option<String>,
    pub indexed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub library_id: i64,
    pub path: String,
    pub filename: String,
    pub size: i64,
    pub mtime: String,
    pub fingerprint: String,
    pub media_type: String,
}

const ITEM_COLUMNS: &str = "id, library_id, path, filename, size, mtime, fingerprint, media_type, status,
    last_completed_stage, progress, error_code, error_message, duration_ms, width, height, fps, codec,
    audio_codec, container, creation_time, creation_time_source, camera_make, camera_model, gps_latitude,
    gps_longitude, is_live_component, live_pair_id, transcript, indexed_at, created_at";

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        library_id: row.get(1)?,
        path: row.get(2)?,
        filename: row.get(3)?,
        size: row.get(4)?,
        mtime: row.get(5)?,
        fingerprint: row.get(6)?,
        media_type: row.get(7)?,
        status: row.get(8)?,
        last_completed_stage: row.get(9)?,
        progress: row.get(10)?,
        error_code: row.get(11)?,
        error_message: row.get(12)?,
        duration_ms: row.get(13)?,
        width: row.get(14)?,
        height: row.get(15)?,
        fps: row.get(16)?,
        codec: row.get(17)?,
        audio_codec: row.get(18)?,
        container: row.get(19)?,
        creation_time: row.get(20)?,
        creation_time_source: row.get(21)?,
        camera_make: row.get(22)?,
        camera_model: row.get(23)?,
        gps_latitude: row.get(24)?,
        gps_longitude: row.get(25)?,
        is_live_component: row.get::<_, i64>(26)? != 0,
        live_pair_id: row.get(27)?,
        transcript: row.get(28)?,
        indexed_at: row.get(29)?,
        created_at: row.get(30)?,
    })
}

pub fn insert_item(conn: &Connection, item: &NewItem) -> Result<i64> {
    crate::store::with_retry(|| {
        conn.execute(
            "INSERT INTO items (library_id, path, filename, size, mtime, fingerprint, media_type, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'QUEUED')",
            params![
                item.library_id,
                item.path,
                item.filename,
                item.size,
                item.mtime,
                item.fingerprint,
                item.media_type,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn get_item(conn: &Connection, id: i64) -> Result<Option<Item>> {
    Ok(conn
        .query_row(&format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS), params![id], row_to_item)
        .optional()?)
}

pub fn get_item_by_path(conn: &Connection, library_id: i64, path: &str) -> Result<Option<Item>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM items WHERE library_id = ?1 AND path = ?2", ITEM_COLUMNS),
            params![library_id, path],
            row_to_item,
        )
        .optional()?)
}

pub fn get_item_by_fingerprint(conn: &Connection, library_id: i64, fingerprint: &str) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM items WHERE library_id = ?1 AND fingerprint = ?2",
        ITEM_COLUMNS
    ))?;
    let rows = stmt.query_map(params![library_id, fingerprint], row_to_item)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_items(
    conn: &Connection,
    library_id: Option<i64>,
    status: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Item>> {
    let mut sql = format!("SELECT {} FROM items WHERE 1=1", ITEM_COLUMNS);
    if library_id.is_some() {
        sql.push_str(" AND library_id = ?1");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?2");
    }
    sql.push_str(" ORDER BY mtime DESC LIMIT ?3 OFFSET ?4");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![library_id.unwrap_or(0), status.unwrap_or(""), limit, offset],
        row_to_item,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_items_by_status(conn: &Connection, statuses: &[&str]) -> Result<Vec<Item>> {
    let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT {} FROM items WHERE status IN ({})", ITEM_COLUMNS, placeholders);
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = statuses.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), row_to_item)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update_item_path(conn: &Connection, id: i64, path: &str, filename: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET path = ?1, filename = ?2 WHERE id = ?3",
            params![path, filename, id],
        )?;
        Ok(())
    })
}

pub fn update_item_fingerprint(conn: &Connection, id: i64, fingerprint: &str, size: i64, mtime: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET fingerprint = ?1, size = ?2, mtime = ?3 WHERE id = ?4",
            params![fingerprint, size, mtime, id],
        )?;
        Ok(())
    })
}

pub fn update_item_status(conn: &Connection, id: i64, status: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("UPDATE items SET status = ?1 WHERE id = ?2", params![status, id])?;
        Ok(())
    })
}

pub fn update_item_stage_progress(
    conn: &Connection,
    id: i64,
    status: &str,
    last_completed_stage: Option<&str>,
    progress: f64,
) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET status = ?1, last_completed_stage = ?2, progress = ?3 WHERE id = ?4",
            params![status, last_completed_stage, progress, id],
        )?;
        Ok(())
    })
}

pub fn mark_item_failed(conn: &Connection, id: i64, error_code: &str, error_message: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET status = 'FAILED', error_code = ?1, error_message = ?2 WHERE id = ?3",
            params![error_code, error_message, id],
        )?;
        Ok(())
    })
}

pub fn mark_item_done(conn: &Connection, id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET status = 'DONE', progress = 100, indexed_at = datetime('now'), error_code = NULL, error_message = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    })
}

pub fn reset_item_for_requeue(conn: &Connection, id: i64, from_stage: Option<&str>) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET status = 'QUEUED', last_completed_stage = ?1, error_code = NULL, error_message = NULL WHERE id = ?2",
            params![from_stage, id],
        )?;
        Ok(())
    })
}

pub fn item_exists(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM items WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Items left in a non-terminal, non-queued status (RUNNING/indexing stages)
/// with no job row actively claiming them — the signature of a crash
/// mid-stage. These are reset to QUEUED from their last completed stage.
pub fn list_items_without_active_job(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT i.id FROM items i
         WHERE i.status NOT IN ('QUEUED', 'DONE', 'FAILED')
           AND NOT EXISTS (
               SELECT 1 FROM jobs j WHERE j.item_id = i.id AND j.status IN ('pending', 'running')
           )",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update_item_container_metadata(conn: &Connection, id: i64, meta: &crate::metadata::MediaMetadata) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET duration_ms = ?1, width = ?2, height = ?3, fps = ?4, codec = ?5, audio_codec = ?6,
                camera_make = ?7, camera_model = ?8, gps_latitude = ?9, gps_longitude = ?10,
                creation_time = ?11, creation_time_source = ?12
             WHERE id = ?13",
            params![
                meta.duration_ms,
                meta.width,
                meta.height,
                meta.fps,
                meta.codec,
                meta.audio_codec,
                meta.camera_make,
                meta.camera_model,
                meta.gps_latitude,
                meta.gps_longitude,
                meta.recorded_at,
                meta.recorded_at_source,
                id,
            ],
        )?;
        Ok(())
    })
}

pub fn set_item_transcript(conn: &Connection, id: i64, transcript: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("UPDATE items SET transcript = ?1 WHERE id = ?2", params![transcript, id])?;
        Ok(())
    })
}

pub fn set_live_pair(conn: &Connection, still_id: i64, video_id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE items SET live_pair_id = ?1 WHERE id = ?2",
            params![video_id, still_id],
        )?;
        conn.execute(
            "UPDATE items SET is_live_component = 1, live_pair_id = ?1 WHERE id = ?2",
            params![still_id, video_id],
        )?;
        Ok(())
    })
}

pub fn delete_item(conn: &Connection, id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(())
    })
}

pub fn list_item_paths(conn: &Connection, library_id: i64) -> Result<Vec<(i64, String, String)>> {
    let mut stmt = conn.prepare("SELECT id, path, fingerprint FROM items WHERE library_id = ?1")?;
    let rows = stmt.query_map(params![library_id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ----- Item metadata -----

pub fn set_item_metadata(conn: &Connection, item_id: i64, key: &str, value: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "INSERT INTO item_metadata (item_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(item_id, key) DO UPDATE SET value = excluded.value",
            params![item_id, key, value],
        )?;
        Ok(())
    })
}

pub fn list_item_metadata(conn: &Connection, item_id: i64) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, value FROM item_metadata WHERE item_id = ?1")?;
    let rows = stmt.query_map(params![item_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ----- Transcript segments -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: i64,
    pub item_id: i64,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    pub confidence: Option<f64>,
}

pub fn insert_transcript_segment(
    conn: &Connection,
    item_id: i64,
    start_ms: i64,
    end_ms: i64,
    text: &str,
    confidence: Option<f64>,
) -> Result<i64> {
    crate::store::with_retry(|| {
        conn.execute(
            "INSERT INTO transcript_segments (item_id, start_ms, end_ms, text, confidence) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![item_id, start_ms, end_ms, text, confidence],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO transcript_segments_fts(rowid, text) VALUES (?1, ?2)",
            params![id, text],
        )?;
        Ok(id)
    })
}

pub fn list_transcript_segments(conn: &Connection, item_id: i64) -> Result<Vec<TranscriptSegment>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, start_ms, end_ms, text, confidence FROM transcript_segments
         WHERE item_id = ?1 ORDER BY start_ms",
    )?;
    let rows = stmt.query_map(params![item_id], |row| {
        Ok(TranscriptSegment {
            id: row.get(0)?,
            item_id: row.get(1)?,
            start_ms: row.get(2)?,
            end_ms: row.get(3)?,
            text: row.get(4)?,
            confidence: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn delete_transcript_segments(conn: &Connection, item_id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        let mut stmt = conn.prepare("SELECT id FROM transcript_segments WHERE item_id = ?1")?;
        let ids: Vec<i64> = stmt
            .query_map(params![item_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for id in ids {
            conn.execute("DELETE FROM transcript_segments_fts WHERE rowid = ?1", params![id])?;
        }
        conn.execute("DELETE FROM transcript_segments WHERE item_id = ?1", params![item_id])?;
        Ok(())
    })
}

// ----- Frames -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: i64,
    pub item_id: i64,
    pub frame_index: i64,
    pub timestamp_ms: i64,
    pub thumbnail_path: Option<String>,
    pub colors: Vec<String>,
}

fn row_to_frame(row: &rusqlite::Row) -> rusqlite::Result<Frame> {
    let colors_json: String = row.get(4)?;
    Ok(Frame {
        id: row.get(0)?,
        item_id: row.get(1)?,
        frame_index: row.get(2)?,
        timestamp_ms: row.get(3)?,
        thumbnail_path: row.get(5)?,
        colors: serde_json::from_str(&colors_json).unwrap_or_default(),
    })
}

pub fn insert_frame(
    conn: &Connection,
    item_id: i64,
    frame_index: i64,
    timestamp_ms: i64,
    colors: &[String],
    thumbnail_path: Option<&str>,
) -> Result<i64> {
    crate::store::with_retry(|| {
        let colors_json = serde_json::to_string(colors)?;
        conn.execute(
            "INSERT INTO frames (item_id, frame_index, timestamp_ms, colors, thumbnail_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![item_id, frame_index, timestamp_ms, colors_json, thumbnail_path],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn list_frames(conn: &Connection, item_id: i64) -> Result<Vec<Frame>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, frame_index, timestamp_ms, colors, thumbnail_path FROM frames
         WHERE item_id = ?1 ORDER BY frame_index",
    )?;
    let rows = stmt.query_map(params![item_id], row_to_frame)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_frame(conn: &Connection, id: i64) -> Result<Option<Frame>> {
    Ok(conn
        .query_row(
            "SELECT id, item_id, frame_index, timestamp_ms, colors, thumbnail_path FROM frames WHERE id = ?1",
            params![id],
            row_to_frame,
        )
        .optional()?)
}

/// Drop all but the first `keep` frames (by index) for an item, per the
/// post-indexing retention policy. Returns the ids that were deleted.
pub fn prune_frames(conn: &Connection, item_id: i64, keep: i64) -> Result<Vec<i64>> {
    crate::store::with_retry(|| {
        let mut stmt = conn.prepare(
            "SELECT id FROM frames WHERE item_id = ?1 ORDER BY frame_index ASC LIMIT -1 OFFSET ?2",
        )?;
        let ids: Vec<i64> = stmt
            .query_map(params![item_id, keep], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for id in &ids {
            conn.execute("DELETE FROM frames WHERE id = ?1", params![id])?;
        }
        Ok(ids)
    })
}

/// Delete every frame row for an item. Detections and faces reference
/// `frame_id` with `ON DELETE CASCADE`, so this also clears their rows —
/// used to clear out a prior run's artifacts before EXTRACTING_FRAMES
/// reruns on a reset item (spec §4.3/§4.4).
pub fn delete_frames_for_item(conn: &Connection, item_id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("DELETE FROM frames WHERE item_id = ?1", params![item_id])?;
        Ok(())
    })
}

// ----- Detections -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: i64,
    pub item_id: i64,
    pub frame_id: i64,
    pub timestamp_ms: i64,
    pub label: String,
    pub confidence: f64,
    pub bbox: [f64; 4],
}

fn row_to_detection(row: &rusqlite::Row) -> rusqlite::Result<Detection> {
    let bbox_json: String = row.get(6)?;
    let bbox: [f64; 4] = serde_json::from_str(&bbox_json).unwrap_or([0.0; 4]);
    Ok(Detection {
        id: row.get(0)?,
        item_id: row.get(1)?,
        frame_id: row.get(2)?,
        timestamp_ms: row.get(3)?,
        label: row.get(4)?,
        confidence: row.get(5)?,
        bbox,
    })
}

pub fn insert_detections_batch(
    conn: &mut Connection,
    item_id: i64,
    frame_id: i64,
    timestamp_ms: i64,
    detections: &[(String, f64, [f64; 4])],
) -> Result<()> {
    crate::store::with_retry(|| {
        let tx = conn.transaction()?;
        for (label, confidence, bbox) in detections {
            let bbox_json = serde_json::to_string(bbox)?;
            tx.execute(
                "INSERT INTO detections (item_id, frame_id, timestamp_ms, label, confidence, bbox)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![item_id, frame_id, timestamp_ms, label, confidence, bbox_json],
            )?;
        }
        tx.commit()?;
        Ok(())
    })
}

pub fn list_detections(conn: &Connection, item_id: i64) -> Result<Vec<Detection>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, frame_id, timestamp_ms, label, confidence, bbox FROM detections
         WHERE item_id = ?1 ORDER BY timestamp_ms",
    )?;
    let rows = stmt.query_map(params![item_id], row_to_detection)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn detections_for_label(conn: &Connection, label: &str, library_id: Option<i64>) -> Result<Vec<Detection>> {
    let mut sql = "SELECT d.id, d.item_id, d.frame_id, d.timestamp_ms, d.label, d.confidence, d.bbox
                   FROM detections d JOIN items i ON i.id = d.item_id
                   WHERE d.label = ?1".to_string();
    if library_id.is_some() {
        sql.push_str(" AND i.library_id = ?2");
    }
    sql.push_str(" ORDER BY d.confidence DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![label, library_id.unwrap_or(0)], row_to_detection)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ----- Faces -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub id: i64,
    pub item_id: i64,
    pub frame_id: i64,
    pub timestamp_ms: i64,
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub crop_path: Option<String>,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub person_id: Option<i64>,
    pub cluster_id: Option<String>,
    pub assignment_source: Option<String>,
    pub assignment_confidence: Option<f64>,
    pub assigned_at: Option<String>,
}

fn row_to_face(row: &rusqlite::Row) -> rusqlite::Result<Face> {
    let bbox_json: String = row.get(4)?;
    let bbox: [f64; 4] = serde_json::from_str(&bbox_json).unwrap_or([0.0; 4]);
    let embedding_blob: Vec<u8> = row.get(6)?;
    Ok(Face {
        id: row.get(0)?,
        item_id: row.get(1)?,
        frame_id: row.get(2)?,
        timestamp_ms: row.get(3)?,
        bbox,
        confidence: row.get(5)?,
        embedding: bytes_to_vec(&embedding_blob),
        crop_path: row.get(7)?,
        person_id: row.get(8)?,
        cluster_id: row.get(9)?,
        assignment_source: row.get(10)?,
        assignment_confidence: row.get(11)?,
        assigned_at: row.get(12)?,
    })
}

const FACE_COLUMNS: &str = "id, item_id, frame_id, timestamp_ms, bbox, confidence, embedding, crop_path,
    person_id, cluster_id, assignment_source, assignment_confidence, assigned_at";

pub fn insert_face(
    conn: &Connection,
    item_id: i64,
    frame_id: i64,
    timestamp_ms: i64,
    bbox: [f64; 4],
    confidence: f64,
    embedding: &[f32],
    crop_path: Option<&str>,
) -> Result<i64> {
    crate::store::with_retry(|| {
        let bbox_json = serde_json::to_string(&bbox)?;
        conn.execute(
            "INSERT INTO faces (item_id, frame_id, timestamp_ms, bbox, confidence, embedding, crop_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![item_id, frame_id, timestamp_ms, bbox_json, confidence, vec_to_bytes(embedding), crop_path],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn get_face(conn: &Connection, id: i64) -> Result<Option<Face>> {
    Ok(conn
        .query_row(&format!("SELECT {} FROM faces WHERE id = ?1", FACE_COLUMNS), params![id], row_to_face)
        .optional()?)
}

pub fn list_faces(conn: &Connection, item_id: i64) -> Result<Vec<Face>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM faces WHERE item_id = ?1 ORDER BY timestamp_ms", FACE_COLUMNS))?;
    let rows = stmt.query_map(params![item_id], row_to_face)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_unassigned_faces(conn: &Connection) -> Result<Vec<Face>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM faces WHERE person_id IS NULL",
        FACE_COLUMNS
    ))?;
    let rows = stmt.query_map([], row_to_face)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_faces_for_person(conn: &Connection, person_id: i64) -> Result<Vec<Face>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM faces WHERE person_id = ?1",
        FACE_COLUMNS
    ))?;
    let rows = stmt.query_map(params![person_id], row_to_face)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn faces_near_timestamp(conn: &Connection, item_id: i64, timestamp_ms: i64, window_ms: i64) -> Result<Vec<Face>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM faces WHERE item_id = ?1 AND timestamp_ms BETWEEN ?2 AND ?3",
        FACE_COLUMNS
    ))?;
    let rows = stmt.query_map(
        params![item_id, timestamp_ms - window_ms, timestamp_ms + window_ms],
        row_to_face,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn assign_face(
    conn: &Connection,
    face_id: i64,
    person_id: Option<i64>,
    source: &str,
    confidence: Option<f64>,
) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE faces SET person_id = ?1, cluster_id = NULL, assignment_source = ?2,
                assignment_confidence = ?3, assigned_at = datetime('now')
             WHERE id = ?4",
            params![person_id, source, confidence, face_id],
        )?;
        Ok(())
    })
}

pub fn set_face_cluster(conn: &Connection, face_id: i64, cluster_id: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("UPDATE faces SET cluster_id = ?1 WHERE id = ?2", params![cluster_id, face_id])?;
        Ok(())
    })
}

fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ----- Persons -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub face_count: i64,
    pub thumbnail_face_id: Option<i64>,
    pub recognition_mode: String,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
        face_count: row.get(2)?,
        thumbnail_face_id: row.get(3)?,
        recognition_mode: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const PERSON_COLUMNS: &str = "id, name, face_count, thumbnail_face_id, recognition_mode, created_at, updated_at";

pub fn insert_person(conn: &Connection, name: &str) -> Result<i64> {
    crate::store::with_retry(|| {
        conn.execute("INSERT INTO persons (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn get_person(conn: &Connection, id: i64) -> Result<Option<Person>> {
    Ok(conn
        .query_row(&format!("SELECT {} FROM persons WHERE id = ?1", PERSON_COLUMNS), params![id], row_to_person)
        .optional()?)
}

pub fn list_persons(conn: &Connection) -> Result<Vec<Person>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM persons ORDER BY name", PERSON_COLUMNS))?;
    let rows = stmt.query_map([], row_to_person)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn recompute_person_face_count(conn: &Connection, person_id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE persons SET face_count = (SELECT COUNT(*) FROM faces WHERE person_id = ?1),
                updated_at = datetime('now') WHERE id = ?1",
            params![person_id],
        )?;
        Ok(())
    })
}

pub fn set_person_thumbnail(conn: &Connection, person_id: i64, face_id: Option<i64>) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE persons SET thumbnail_face_id = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![face_id, person_id],
        )?;
        Ok(())
    })
}

pub fn set_person_recognition_mode(conn: &Connection, person_id: i64, mode: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE persons SET recognition_mode = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![mode, person_id],
        )?;
        Ok(())
    })
}

pub fn delete_person(conn: &Connection, id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute("DELETE FROM persons WHERE id = ?1", params![id])?;
        Ok(())
    })
}

pub fn reassign_all_faces(conn: &Connection, from_person: i64, to_person: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE faces SET person_id = ?1 WHERE person_id = ?2",
            params![to_person, from_person],
        )?;
        Ok(())
    })
}

// ----- Face examples (references / negatives) -----

pub fn add_face_example(conn: &Connection, face_id: i64, person_id: i64, kind: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "INSERT OR IGNORE INTO face_examples (face_id, person_id, kind) VALUES (?1, ?2, ?3)",
            params![face_id, person_id, kind],
        )?;
        Ok(())
    })
}

pub fn list_face_examples(conn: &Connection, person_id: i64, kind: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT face_id FROM face_examples WHERE person_id = ?1 AND kind = ?2")?;
    let rows = stmt.query_map(params![person_id, kind], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Faces recorded as explicit negative examples for a person, embeddings
/// included — used to exclude a *new* candidate face whose embedding lands
/// too close to one of these even though it was never itself marked
/// negative for this person (spec §4.6 negative-tolerance exclusion).
pub fn list_negative_example_faces(conn: &Connection, person_id: i64) -> Result<Vec<Face>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM faces WHERE id IN (
            SELECT face_id FROM face_examples WHERE person_id = ?1 AND kind = 'negative'
         )",
        FACE_COLUMNS
    ))?;
    let rows = stmt.query_map(params![person_id], row_to_face)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn is_negative_for(conn: &Connection, face_id: i64, person_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM face_examples WHERE face_id = ?1 AND person_id = ?2 AND kind = 'negative'",
        params![face_id, person_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ----- Pair thresholds -----

pub fn get_pair_threshold(conn: &Connection, person_a: i64, person_b: i64) -> Result<f64> {
    let (a, b) = if person_a <= person_b { (person_a, person_b) } else { (person_b, person_a) };
    let value: Option<f64> = conn
        .query_row(
            "SELECT threshold FROM pair_thresholds WHERE person_a = ?1 AND person_b = ?2",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(crate::constants::PAIR_THRESHOLD_MIN as f64))
}

/// Increment the threshold for a pair by `step`, capped at `max`. Never
/// decreases — invariant 4 in the testable properties.
pub fn bump_pair_threshold(conn: &Connection, person_a: i64, person_b: i64) -> Result<f64> {
    crate::store::with_retry(|| {
        let (a, b) = if person_a <= person_b { (person_a, person_b) } else { (person_b, person_a) };
        let current = get_pair_threshold(conn, a, b)?;
        let next = (current + crate::constants::PAIR_THRESHOLD_STEP as f64)
            .min(crate::constants::PAIR_THRESHOLD_MAX as f64);
        conn.execute(
            "INSERT INTO pair_thresholds (person_a, person_b, threshold) VALUES (?1, ?2, ?3)
             ON CONFLICT(person_a, person_b) DO UPDATE SET threshold = ?3, updated_at = datetime('now')",
            params![a, b, next],
        )?;
        Ok(next)
    })
}

// ----- Jobs -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub item_id: i64,
    pub status: String,
    pub current_stage: Option<String>,
    pub progress: f64,
    pub message: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub claimed_by: Option<String>,
    pub run_token: Option<String>,
    pub lease_expires_at: Option<String>,
    pub attempts: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        item_id: row.get(1)?,
        status: row.get(2)?,
        current_stage: row.get(3)?,
        progress: row.get(4)?,
        message: row.get(5)?,
        error_code: row.get(6)?,
        error_message: row.get(7)?,
        claimed_by: row.get(8)?,
        run_token: row.get(9)?,
        lease_expires_at: row.get(10)?,
        attempts: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

const JOB_COLUMNS: &str = "id, item_id, status, current_stage, progress, message, error_code, error_message,
    claimed_by, run_token, lease_expires_at, attempts, created_at, updated_at";

pub fn create_job(conn: &Connection, item_id: i64) -> Result<i64> {
    crate::store::with_retry(|| {
        conn.execute("INSERT INTO jobs (item_id) VALUES (?1)", params![item_id])?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn get_job(conn: &Connection, id: i64) -> Result<Option<Job>> {
    Ok(conn
        .query_row(&format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS), params![id], row_to_job)
        .optional()?)
}

pub fn list_jobs(conn: &Connection, status: Option<&str>) -> Result<Vec<Job>> {
    let sql = match status {
        Some(_) => format!("SELECT {} FROM jobs WHERE status = ?1 ORDER BY created_at", JOB_COLUMNS),
        None => format!("SELECT {} FROM jobs ORDER BY created_at", JOB_COLUMNS),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![status.unwrap_or("")], row_to_job)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Atomically claim the oldest pending job with an unexpired retry schedule,
/// setting a lease and run token so a crashed worker's claim is recoverable.
pub fn claim_job(conn: &Connection, worker_id: &str, lease_seconds: i64) -> Result<Option<Job>> {
    crate::store::with_retry(|| {
        let run_token = uuid::Uuid::new_v4().to_string();
        let sql = format!(
            "UPDATE jobs SET status = 'running', claimed_by = ?1, run_token = ?2,
                lease_expires_at = datetime('now', ?3), heartbeat_at = datetime('now'), updated_at = datetime('now')
             WHERE id = (
                SELECT id FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1
             )
             RETURNING {}",
            JOB_COLUMNS
        );
        let lease_offset = format!("+{} seconds", lease_seconds);
        let result = conn.query_row(&sql, params![worker_id, run_token, lease_offset], row_to_job);
        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(EngineError::Database(e)),
        }
    })
}

pub fn update_job_progress(conn: &Connection, id: i64, stage: &str, progress: f64, message: Option<&str>) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE jobs SET current_stage = ?1, progress = ?2, message = ?3, heartbeat_at = datetime('now'),
                updated_at = datetime('now') WHERE id = ?4",
            params![stage, progress, message, id],
        )?;
        Ok(())
    })
}

pub fn complete_job(conn: &Connection, id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE jobs SET status = 'completed', progress = 100, updated_at = datetime('now') WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    })
}

pub fn fail_job(conn: &Connection, id: i64, error_code: &str, error_message: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE jobs SET status = 'failed', error_code = ?1, error_message = ?2, updated_at = datetime('now')
             WHERE id = ?3",
            params![error_code, error_message, id],
        )?;
        Ok(())
    })
}

pub fn cancel_job(conn: &Connection, id: i64) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "UPDATE jobs SET status = 'cancelled', updated_at = datetime('now') WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    })
}

/// Reclaim jobs whose lease has expired without a heartbeat: marks them lost
/// so consistency repair / auto-continuation can requeue the owning item.
pub fn reclaim_expired_jobs(conn: &Connection) -> Result<usize> {
    crate::store::with_retry(|| {
        let rows = conn.execute(
            "UPDATE jobs SET status = 'failed', error_code = 'UNKNOWN_ERROR', error_message = 'lease expired',
                updated_at = datetime('now')
             WHERE status = 'running' AND lease_expires_at < datetime('now')",
            [],
        )?;
        Ok(rows)
    })
}

// ----- Settings -----

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    })
}

pub fn list_settings(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ----- Tags -----

pub fn get_or_create_tag(conn: &Connection, name: &str) -> Result<i64> {
    crate::store::with_retry(|| {
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
        let id: i64 = conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| row.get(0))?;
        Ok(id)
    })
}

pub fn tag_item(conn: &Connection, item_id: i64, tag_name: &str) -> Result<()> {
    crate::store::with_retry(|| {
        let tag_id = get_or_create_tag(conn, tag_name)?;
        conn.execute(
            "INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?1, ?2)",
            params![item_id, tag_id],
        )?;
        Ok(())
    })
}

pub fn untag_item(conn: &Connection, item_id: i64, tag_name: &str) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "DELETE FROM item_tags WHERE item_id = ?1 AND tag_id = (SELECT id FROM tags WHERE name = ?2)",
            params![item_id, tag_name],
        )?;
        Ok(())
    })
}

pub fn list_item_tags(conn: &Connection, item_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t JOIN item_tags it ON it.tag_id = t.id WHERE it.item_id = ?1",
    )?;
    let rows = stmt.query_map(params![item_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ----- Favorites -----

pub fn set_favorite(conn: &Connection, kind: &str, target_id: i64, favorite: bool) -> Result<()> {
    crate::store::with_retry(|| {
        if favorite {
            conn.execute(
                "INSERT OR IGNORE INTO favorites (kind, target_id) VALUES (?1, ?2)",
                params![kind, target_id],
            )?;
        } else {
            conn.execute(
                "DELETE FROM favorites WHERE kind = ?1 AND target_id = ?2",
                params![kind, target_id],
            )?;
        }
        Ok(())
    })
}

pub fn list_favorites(conn: &Connection, kind: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT target_id FROM favorites WHERE kind = ?1")?;
    let rows = stmt.query_map(params![kind], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ----- Network ledger -----

pub fn record_network_request(conn: &Connection, purpose: &str, url: &str, succeeded: bool) -> Result<()> {
    crate::store::with_retry(|| {
        conn.execute(
            "INSERT INTO network_requests (purpose, url, succeeded) VALUES (?1, ?2, ?3)",
            params![purpose, url, succeeded as i64],
        )?;
        Ok(())
    })
}

pub fn count_network_requests(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM network_requests", [], |row| row.get(0))
        .map_err(EngineError::from)
}

// ----- Cross-entity listings for the face review queue and backup -----

/// Every recorded pair threshold above the floor — these are the person
/// pairs the recognizer has been corrected into treating as confusable.
pub fn list_pair_thresholds(conn: &Connection) -> Result<Vec<(i64, i64, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT person_a, person_b, threshold FROM pair_thresholds
         WHERE threshold > ?1 ORDER BY threshold DESC",
    )?;
    let rows = stmt.query_map(params![crate::constants::PAIR_THRESHOLD_MIN as f64], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Auto-assigned faces below `threshold` — candidates for user confirmation
/// rather than ones the recognizer was confident enough to accept silently.
pub fn list_faces_for_review(conn: &Connection, threshold: f64) -> Result<Vec<Face>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM faces WHERE assignment_source = 'auto' AND person_id IS NOT NULL
         AND assignment_confidence < ?1 ORDER BY assignment_confidence ASC",
        FACE_COLUMNS
    ))?;
    let rows = stmt.query_map(params![threshold], row_to_face)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Face ids recorded as reference or negative examples for a person, paired
/// with their kind — the shape the metadata-only backup export needs.
pub fn list_face_examples_with_kind(conn: &Connection, person_id: i64) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT face_id, kind FROM face_examples WHERE person_id = ?1")?;
    let rows = stmt.query_map(params![person_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_all_item_tags(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT it.item_id, t.name FROM item_tags it JOIN tags t ON t.id = it.tag_id",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    #[test]
    fn inserts_and_fetches_library() {
        let conn = open_memory().unwrap();
        let id = insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let lib = get_library(&conn, id).unwrap().unwrap();
        assert_eq!(lib.path, "/tmp/clips");
        assert!(lib.recursive);
    }

    #[test]
    fn item_path_unique_within_library() {
        let conn = open_memory().unwrap();
        let lib_id = insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item = NewItem {
            library_id: lib_id,
            path: "a.mp4".into(),
            filename: "a.mp4".into(),
            size: 10,
            mtime: "2020-01-01T00:00:00Z".into(),
            fingerprint: "fp1".into(),
            media_type: "video".into(),
        };
        insert_item(&conn, &item).unwrap();
        let err = insert_item(&conn, &item);
        assert!(err.is_err());
    }

    #[test]
    fn deleting_frames_for_item_cascades_to_detections_and_faces() {
        let mut conn = open_memory().unwrap();
        let lib_id = insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item_id = insert_item(
            &conn,
            &NewItem {
                library_id: lib_id,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 10,
                mtime: "now".into(),
                fingerprint: "fp1".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        let frame_id = insert_frame(&conn, item_id, 0, 0, &[], None).unwrap();
        insert_detections_batch(&mut conn, item_id, frame_id, 0, &[("dog".into(), 0.9, [0.0, 0.0, 1.0, 1.0])])
            .unwrap();
        insert_face(&conn, item_id, frame_id, 0, [0.0, 0.0, 1.0, 1.0], 0.9, &[0.1, 0.2], None).unwrap();

        delete_frames_for_item(&conn, item_id).unwrap();

        assert!(list_frames(&conn, item_id).unwrap().is_empty());
        assert!(list_detections(&conn, item_id).unwrap().is_empty());
        assert!(list_faces(&conn, item_id).unwrap().is_empty());
    }

    #[test]
    fn face_embedding_round_trips_through_blob() {
        let conn = open_memory().unwrap();
        let lib_id = insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item_id = insert_item(
            &conn,
            &NewItem {
                library_id: lib_id,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 10,
                mtime: "now".into(),
                fingerprint: "fp1".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        let frame_id = insert_frame(&conn, item_id, 0, 0, &[], None).unwrap();
        let embedding = vec![0.1f32, 0.2, -0.3];
        let face_id = insert_face(&conn, item_id, frame_id, 0, [0.0, 0.0, 1.0, 1.0], 0.9, &embedding, None).unwrap();
        let face = get_face(&conn, face_id).unwrap().unwrap();
        assert_eq!(face.embedding.len(), 3);
        assert!((face.embedding[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn pair_threshold_bumps_are_order_independent_and_capped() {
        let conn = open_memory().unwrap();
        let a = insert_person(&conn, "A").unwrap();
        let b = insert_person(&conn, "B").unwrap();
        assert_eq!(get_pair_threshold(&conn, a, b).unwrap(), 0.70);
        for _ in 0..20 {
            bump_pair_threshold(&conn, b, a).unwrap();
        }
        assert_eq!(get_pair_threshold(&conn, a, b).unwrap(), 0.85);
    }

    #[test]
    fn claim_job_sets_running_and_lease() {
        let conn = open_memory().unwrap();
        let lib_id = insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item_id = insert_item(
            &conn,
            &NewItem {
                library_id: lib_id,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 10,
                mtime: "now".into(),
                fingerprint: "fp1".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        create_job(&conn, item_id).unwrap();
        let job = claim_job(&conn, "worker:1", 60).unwrap().unwrap();
        assert_eq!(job.status, "running");
        assert!(claim_job(&conn, "worker:1", 60).unwrap().is_none());
    }
}
