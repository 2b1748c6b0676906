// Startup consistency repair: the engine may have been killed mid-stage, so
// every startup walks the item/job tables and the on-disk artifact folders
// looking for inconsistencies left by an unclean shutdown, and fixes them
// before serving requests.

use crate::error::Result;
use crate::store::schema;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Default, Serialize)]
pub struct RepairReport {
    /// Items whose status indicated an in-flight stage with no live job
    /// claim; requeued to pick up where they left off.
    pub items_requeued: usize,
    /// Jobs whose lease had already expired; reclaimed for retry.
    pub jobs_reclaimed: usize,
    /// Vector shard files with no matching item row, removed.
    pub orphaned_shards_removed: usize,
    /// Thumbnail files with no matching item row, removed.
    pub orphaned_thumbs_removed: usize,
    /// Leftover `.tmp` files from an interrupted atomic write, removed.
    pub temp_files_removed: usize,
    /// DONE items missing a required on-disk artifact, reset to QUEUED.
    pub done_items_repaired: usize,
}

/// Run on every startup, after the lockfile is claimed and before the HTTP
/// server starts accepting requests.
pub fn run_consistency_repair(
    conn: &Connection,
    thumbs_dir: &Path,
    shards_dir: &Path,
    faces_dir: &Path,
) -> Result<RepairReport> {
    let mut report = RepairReport::default();

    report.jobs_reclaimed = schema::reclaim_expired_jobs(conn)?;
    report.items_requeued = requeue_orphaned_items(conn)?;
    report.done_items_repaired = requeue_done_items_with_missing_artifacts(conn, shards_dir, thumbs_dir)?;
    report.orphaned_shards_removed = sweep_orphaned_shards(conn, shards_dir)?;
    report.orphaned_thumbs_removed = sweep_orphaned_artifacts(conn, thumbs_dir)?;
    report.orphaned_thumbs_removed += sweep_orphaned_artifacts(conn, faces_dir)?;
    report.temp_files_removed = sweep_temp_files(thumbs_dir)?
        + sweep_temp_files(shards_dir)?
        + sweep_temp_files(faces_dir)?;

    tracing::info!(
        items_requeued = report.items_requeued,
        jobs_reclaimed = report.jobs_reclaimed,
        orphaned_shards_removed = report.orphaned_shards_removed,
        orphaned_thumbs_removed = report.orphaned_thumbs_removed,
        temp_files_removed = report.temp_files_removed,
        "consistency repair complete"
    );

    Ok(report)
}

/// Items stuck in a non-terminal stage with no corresponding live job row
/// are reset to queue for their current stage again. A crash between
/// "mark stage in-progress" and "write job row" is the scenario this guards.
/// The item's `last_completed_stage` is preserved so the pipeline resumes
/// after the last artifact actually on disk rather than restarting from
/// the first stage (spec §4.4).
fn requeue_orphaned_items(conn: &Connection) -> Result<usize> {
    let stuck = schema::list_items_without_active_job(conn)?;
    for item_id in &stuck {
        let last_completed_stage = schema::get_item(conn, *item_id)?
            .and_then(|item| item.last_completed_stage);
        schema::reset_item_for_requeue(conn, *item_id, last_completed_stage.as_deref())?;
    }
    Ok(stuck.len())
}

/// A DONE item whose required artifacts vanished out-of-band (shard deleted
/// for a video, transcript rows wiped, frames never materialized) is no
/// longer trustworthy as "indexed" — reset it to QUEUED so the pipeline
/// rebuilds whatever is missing (spec §4.2.1 bullet 2).
fn requeue_done_items_with_missing_artifacts(
    conn: &Connection,
    shards_dir: &Path,
    thumbs_dir: &Path,
) -> Result<usize> {
    let mut repaired = 0;
    for item in schema::list_items_by_status(conn, &["DONE"])? {
        let is_video = item.media_type == "video";
        let shard_ok = !is_video || crate::store::vector_shard::shard_exists(shards_dir, item.id);
        let frames = schema::list_frames(conn, item.id)?;
        let frames_ok = !frames.is_empty()
            && frames.iter().all(|f| {
                f.thumbnail_path
                    .as_ref()
                    .map(|p| thumbs_dir.join(p).exists())
                    .unwrap_or(false)
            });
        let transcript_ok = !is_video || !schema::list_transcript_segments(conn, item.id)?.is_empty();

        if shard_ok && frames_ok && transcript_ok {
            continue;
        }

        schema::reset_item_for_requeue(conn, item.id, None)?;
        repaired += 1;
    }
    Ok(repaired)
}

fn sweep_orphaned_shards(conn: &Connection, shards_dir: &Path) -> Result<usize> {
    sweep_dir_by_stem(shards_dir, "vec", |id| schema::item_exists(conn, id))
}

fn sweep_orphaned_artifacts(conn: &Connection, dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    sweep_dir_by_stem(dir, "jpg", |id| schema::item_exists(conn, id))
}

fn sweep_dir_by_stem(
    dir: &Path,
    extension: &str,
    still_referenced: impl Fn(i64) -> Result<bool>,
) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(id) = stem.parse::<i64>() else {
            continue;
        };
        if !still_referenced(id)? {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn sweep_temp_files(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_tmp = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.ends_with("tmp"))
            .unwrap_or(false);
        if is_tmp {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{open_memory, schema};
    use tempfile::tempdir;

    #[test]
    fn sweeps_orphaned_shard_with_no_matching_item() {
        let conn = open_memory().unwrap();
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("999.vec"), b"orphan").unwrap();

        let report = run_consistency_repair(&conn, dir.path(), dir.path(), dir.path()).unwrap();
        assert_eq!(report.orphaned_shards_removed, 1);
        assert!(!dir.path().join("999.vec").exists());
    }

    #[test]
    fn keeps_shard_for_existing_item() {
        let conn = open_memory().unwrap();
        let lib_id = schema::insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item_id = schema::insert_item(
            &conn,
            &schema::NewItem {
                library_id: lib_id,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{}.vec", item_id)), b"kept").unwrap();

        let report = run_consistency_repair(&conn, dir.path(), dir.path(), dir.path()).unwrap();
        assert_eq!(report.orphaned_shards_removed, 0);
        assert!(dir.path().join(format!("{}.vec", item_id)).exists());
    }

    #[test]
    fn done_video_missing_its_shard_is_requeued() {
        let conn = open_memory().unwrap();
        let lib_id = schema::insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item_id = schema::insert_item(
            &conn,
            &schema::NewItem {
                library_id: lib_id,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        schema::insert_frame(&conn, item_id, 0, 0, &[], Some("frame.jpg")).unwrap();
        schema::insert_transcript_segment(&conn, item_id, 0, 1000, "hi", Some(0.9)).unwrap();
        schema::mark_item_done(&conn, item_id).unwrap();

        let dir = tempdir().unwrap();
        // No shard file written for this item — the DONE invariant is broken.
        let report = run_consistency_repair(&conn, dir.path(), dir.path(), dir.path()).unwrap();

        assert_eq!(report.done_items_repaired, 1);
        let item = schema::get_item(&conn, item_id).unwrap().unwrap();
        assert_eq!(item.status, "QUEUED");
    }

    #[test]
    fn orphaned_item_resumes_from_its_last_completed_stage_not_from_scratch() {
        let conn = open_memory().unwrap();
        let lib_id = schema::insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item_id = schema::insert_item(
            &conn,
            &schema::NewItem {
                library_id: lib_id,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        // Simulate a crash mid-EMBEDDING: TRANSCRIBING already completed, no job row left behind.
        schema::update_item_stage_progress(&conn, item_id, "EMBEDDING", Some("TRANSCRIBING"), 40.0).unwrap();

        let dir = tempdir().unwrap();
        let report = run_consistency_repair(&conn, dir.path(), dir.path(), dir.path()).unwrap();

        assert_eq!(report.items_requeued, 1);
        let item = schema::get_item(&conn, item_id).unwrap().unwrap();
        assert_eq!(item.status, "QUEUED");
        assert_eq!(item.last_completed_stage.as_deref(), Some("TRANSCRIBING"));
    }

    #[test]
    fn removes_leftover_temp_files() {
        let conn = open_memory().unwrap();
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("5.vec.tmp"), b"partial").unwrap();

        let report = run_consistency_repair(&conn, dir.path(), dir.path(), dir.path()).unwrap();
        assert!(report.temp_files_removed >= 1);
        assert!(!dir.path().join("5.vec.tmp").exists());
    }
}
