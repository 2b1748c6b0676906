// Schema migrations. Additive and forward-only: once shipped, a migration is
// never edited or removed. Applied idempotently via `PRAGMA user_version`.

use crate::error::Result;
use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[
    // Migration 1: initial schema.
    r#"
    CREATE TABLE libraries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        recursive INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        library_id INTEGER NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        filename TEXT NOT NULL,
        size INTEGER NOT NULL,
        mtime TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        media_type TEXT NOT NULL CHECK (media_type IN ('video', 'photo')),
        status TEXT NOT NULL DEFAULT 'QUEUED',
        last_completed_stage TEXT,
        progress REAL NOT NULL DEFAULT 0,
        error_code TEXT,
        error_message TEXT,
        duration_ms INTEGER,
        width INTEGER,
        height INTEGER,
        fps REAL,
        codec TEXT,
        audio_codec TEXT,
        container TEXT,
        creation_time TEXT,
        creation_time_source TEXT,
        camera_make TEXT,
        camera_model TEXT,
        gps_latitude REAL,
        gps_longitude REAL,
        is_live_component INTEGER NOT NULL DEFAULT 0,
        live_pair_id INTEGER REFERENCES items(id) ON DELETE SET NULL,
        transcript TEXT,
        indexed_at TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(library_id, path)
    );

    CREATE TABLE item_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT,
        UNIQUE(item_id, key)
    );

    CREATE TABLE transcript_segments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        start_ms INTEGER NOT NULL,
        end_ms INTEGER NOT NULL,
        text TEXT NOT NULL,
        confidence REAL
    );

    CREATE VIRTUAL TABLE transcript_segments_fts USING fts5(
        text,
        content='transcript_segments',
        content_rowid='id'
    );

    CREATE TABLE frames (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        frame_index INTEGER NOT NULL,
        timestamp_ms INTEGER NOT NULL,
        thumbnail_path TEXT,
        colors TEXT NOT NULL DEFAULT '[]',
        UNIQUE(item_id, frame_index)
    );

    CREATE TABLE detections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        frame_id INTEGER NOT NULL REFERENCES frames(id) ON DELETE CASCADE,
        timestamp_ms INTEGER NOT NULL,
        label TEXT NOT NULL,
        confidence REAL NOT NULL,
        bbox TEXT NOT NULL
    );

    CREATE TABLE persons (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        face_count INTEGER NOT NULL DEFAULT 0,
        thumbnail_face_id INTEGER,
        recognition_mode TEXT NOT NULL DEFAULT 'average'
            CHECK (recognition_mode IN ('average', 'reference_only', 'weighted')),
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE faces (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        frame_id INTEGER NOT NULL REFERENCES frames(id) ON DELETE CASCADE,
        timestamp_ms INTEGER NOT NULL,
        bbox TEXT NOT NULL,
        confidence REAL NOT NULL,
        crop_path TEXT,
        embedding BLOB NOT NULL,
        person_id INTEGER REFERENCES persons(id) ON DELETE SET NULL,
        cluster_id TEXT,
        assignment_source TEXT CHECK (assignment_source IN ('auto', 'manual', 'reference', 'legacy')),
        assignment_confidence REAL,
        assigned_at TEXT
    );

    CREATE TABLE face_examples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        face_id INTEGER NOT NULL REFERENCES faces(id) ON DELETE CASCADE,
        person_id INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        kind TEXT NOT NULL CHECK (kind IN ('reference', 'negative')),
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(face_id, person_id, kind)
    );

    CREATE TABLE pair_thresholds (
        person_a INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        person_b INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        threshold REAL NOT NULL DEFAULT 0.70,
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (person_a, person_b)
    );

    CREATE TABLE jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),
        current_stage TEXT,
        progress REAL NOT NULL DEFAULT 0,
        message TEXT,
        error_code TEXT,
        error_message TEXT,
        claimed_by TEXT,
        run_token TEXT,
        lease_expires_at TEXT,
        heartbeat_at TEXT,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE item_tags (
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (item_id, tag_id)
    );

    CREATE TABLE favorites (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL CHECK (kind IN ('item', 'person')),
        target_id INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(kind, target_id)
    );

    CREATE TABLE network_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        purpose TEXT NOT NULL,
        url TEXT NOT NULL,
        succeeded INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_items_library ON items(library_id);
    CREATE INDEX idx_items_status ON items(status);
    CREATE INDEX idx_items_fingerprint ON items(fingerprint);
    CREATE INDEX idx_transcript_item ON transcript_segments(item_id);
    CREATE INDEX idx_frames_item ON frames(item_id);
    CREATE INDEX idx_detections_item ON detections(item_id);
    CREATE INDEX idx_detections_frame ON detections(frame_id);
    CREATE INDEX idx_detections_label ON detections(label);
    CREATE INDEX idx_faces_item ON faces(item_id);
    CREATE INDEX idx_faces_person ON faces(person_id);
    CREATE INDEX idx_faces_cluster ON faces(cluster_id);
    CREATE INDEX idx_jobs_status ON jobs(status);
    CREATE INDEX idx_jobs_item ON jobs(item_id);
    CREATE INDEX idx_item_tags_tag ON item_tags(tag_id);
    "#,
];

fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// The current `PRAGMA user_version`, exposed for the backup export's
/// `schema_version` field (spec §6 "metadata-only backup with
/// schema_version").
pub fn schema_version(conn: &Connection) -> Result<u32> {
    get_schema_version(conn)
}

/// Apply all migrations not yet reflected in `PRAGMA user_version`. Safe to
/// call on every startup; a fully up-to-date database is a no-op.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    if current_version >= target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;
        tracing::info!(version = migration_version, "applied store migration");
    }

    Ok(())
}
