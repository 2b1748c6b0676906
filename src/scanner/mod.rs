// Filesystem scanner: walks a library root, classifies every discovered path
// against the Store by content fingerprint, and emits the resulting
// new/changed/renamed/deleted deltas. See spec §4.3.
//
// Runs synchronously over a `rusqlite::Connection`; callers (the pipeline's
// auto-continuation sweep, or the `/libraries/{id}/scan` handler) invoke it
// on a worker thread and forward the returned `ScanReport` as a
// `scan_progress` event.

pub mod live_photo;

use crate::constants::{PHOTO_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::error::Result;
use crate::hash::compute_fingerprint;
use crate::metadata;
use crate::store::schema::{self, Library, NewItem};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Per-library scan outcome, mirrored into a `scan_progress` event.
#[derive(Debug, Default, Serialize, Clone)]
pub struct ScanReport {
    pub library_id: i64,
    pub files_found: usize,
    pub files_new: usize,
    pub files_changed: usize,
    pub files_renamed: usize,
    pub files_deleted: usize,
}

struct DiscoveredFile {
    path: PathBuf,
    relative: String,
    size: i64,
    mtime: String,
    media_type: String,
}

/// Walk `library.path`, classify every discovered file against the stored
/// rows for this library, and apply the resulting deltas. Safe to call
/// repeatedly: an unchanged filesystem round-trips as a no-op (Testable
/// Property "round-trip/idempotence").
pub fn scan_library(conn: &Connection, library: &Library) -> Result<ScanReport> {
    let mut report = ScanReport {
        library_id: library.id,
        ..Default::default()
    };

    let discovered = walk_library(&library.path, library.recursive);
    report.files_found = discovered.len();

    let mut seen_paths: HashSet<String> = HashSet::new();

    for file in &discovered {
        seen_paths.insert(file.relative.clone());
        classify_and_apply(conn, library, file, &mut report)?;
    }

    delete_missing(conn, library, &seen_paths, &mut report)?;
    live_photo::pair_live_photos(conn, library.id)?;

    tracing::info!(
        library_id = library.id,
        files_found = report.files_found,
        files_new = report.files_new,
        files_changed = report.files_changed,
        files_renamed = report.files_renamed,
        files_deleted = report.files_deleted,
        "scan complete"
    );

    Ok(report)
}

fn walk_library(root: &str, recursive: bool) -> Vec<DiscoveredFile> {
    let root_path = Path::new(root);
    let mut out = Vec::new();

    let walker = if recursive {
        WalkDir::new(root_path)
    } else {
        WalkDir::new(root_path).max_depth(1)
    };

    for entry in walker.follow_links(false).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || !is_media_extension(path) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root_path) else {
            continue;
        };
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0).unwrap_or_default())
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();

        out.push(DiscoveredFile {
            path: path.to_path_buf(),
            relative: relative.to_string_lossy().replace('\\', "/"),
            size: meta.len() as i64,
            mtime,
            media_type: metadata::detect_media_type(path),
        });
    }

    out.sort_by(|a, b| a.relative.cmp(&b.relative));
    out
}

fn is_media_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str()) || PHOTO_EXTENSIONS.contains(&ext.as_str())
}

/// Classify one discovered path against the Store and apply the matching
/// delta (spec §4.3 change classification table).
fn classify_and_apply(
    conn: &Connection,
    library: &Library,
    file: &DiscoveredFile,
    report: &mut ScanReport,
) -> Result<()> {
    let fingerprint = compute_fingerprint(&file.path)?;
    let by_path = schema::get_item_by_path(conn, library.id, &file.relative)?;

    match by_path {
        Some(existing) if existing.fingerprint == fingerprint => {
            // UNCHANGED
            Ok(())
        }
        Some(existing) => {
            // CHANGED: update fingerprint, re-extract container metadata, reset
            // indexing state so the pipeline reprocesses from the beginning.
            schema::update_item_fingerprint(conn, existing.id, &fingerprint, file.size, &file.mtime)?;
            extract_and_store_metadata(conn, existing.id, file)?;
            schema::reset_item_for_requeue(conn, existing.id, None)?;
            schema::delete_transcript_segments(conn, existing.id)?;
            report.files_changed += 1;
            Ok(())
        }
        None => {
            let by_fingerprint = schema::get_item_by_fingerprint(conn, library.id, &fingerprint)?;
            match by_fingerprint.into_iter().next() {
                Some(existing) => {
                    // RENAMED: same content, different path. Path only.
                    let filename = file
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    schema::update_item_path(conn, existing.id, &file.relative, &filename)?;
                    report.files_renamed += 1;
                    Ok(())
                }
                None => {
                    // NEW
                    let filename = file
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let item_id = schema::insert_item(
                        conn,
                        &NewItem {
                            library_id: library.id,
                            path: file.relative.clone(),
                            filename,
                            size: file.size,
                            mtime: file.mtime.clone(),
                            fingerprint,
                            media_type: file.media_type.clone(),
                        },
                    )?;
                    extract_and_store_metadata(conn, item_id, file)?;
                    schema::create_job(conn, item_id)?;
                    report.files_new += 1;
                    Ok(())
                }
            }
        }
    }
}

fn extract_and_store_metadata(conn: &Connection, item_id: i64, file: &DiscoveredFile) -> Result<()> {
    match metadata::extract_metadata(&file.path) {
        Ok(meta) => schema::update_item_container_metadata(conn, item_id, &meta),
        Err(e) => {
            tracing::warn!(item_id, error = %e, "metadata extraction failed, indexing will proceed without it");
            Ok(())
        }
    }
}

/// Stored paths that did not appear in this scan are deleted (cascades to
/// Frame/Detection/Face/transcript rows and, via the caller, their on-disk
/// artifacts get swept on the next consistency repair).
fn delete_missing(
    conn: &Connection,
    library: &Library,
    seen_paths: &HashSet<String>,
    report: &mut ScanReport,
) -> Result<()> {
    let stored = schema::list_item_paths(conn, library.id)?;
    for (id, path, _fingerprint) in stored {
        if !seen_paths.contains(&path) {
            schema::delete_item(conn, id)?;
            report.files_deleted += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;
    use std::fs;
    use tempfile::tempdir;

    fn make_library(conn: &Connection, root: &Path) -> Library {
        let id = schema::insert_library(conn, &root.to_string_lossy(), "Test", true).unwrap();
        schema::get_library(conn, id).unwrap().unwrap()
    }

    #[test]
    fn discovers_new_file_and_queues_it() {
        let conn = open_memory().unwrap();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("hello.mp4"), b"fake video bytes").unwrap();
        let library = make_library(&conn, dir.path());

        let report = scan_library(&conn, &library).unwrap();
        assert_eq!(report.files_new, 1);
        assert_eq!(report.files_found, 1);

        let items = schema::list_items(&conn, Some(library.id), None, 10, 0).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, "QUEUED");
    }

    #[test]
    fn second_scan_of_unchanged_tree_is_a_no_op() {
        let conn = open_memory().unwrap();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("hello.mp4"), b"fake video bytes").unwrap();
        let library = make_library(&conn, dir.path());

        scan_library(&conn, &library).unwrap();
        let second = scan_library(&conn, &library).unwrap();
        assert_eq!(second.files_new, 0);
        assert_eq!(second.files_changed, 0);
        assert_eq!(second.files_deleted, 0);
    }

    #[test]
    fn rename_with_identical_content_updates_path_only() {
        let conn = open_memory().unwrap();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.mp4"), b"same bytes").unwrap();
        let library = make_library(&conn, dir.path());
        scan_library(&conn, &library).unwrap();

        fs::rename(dir.path().join("x.mp4"), dir.path().join("y.mp4")).unwrap();
        let report = scan_library(&conn, &library).unwrap();

        assert_eq!(report.files_renamed, 1);
        assert_eq!(report.files_deleted, 0);
        let items = schema::list_items(&conn, Some(library.id), None, 10, 0).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "y.mp4");
    }

    #[test]
    fn changed_content_resets_indexing_state() {
        let conn = open_memory().unwrap();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.mp4"), b"version one").unwrap();
        let library = make_library(&conn, dir.path());
        scan_library(&conn, &library).unwrap();

        let item_id = schema::list_items(&conn, Some(library.id), None, 10, 0).unwrap()[0].id;
        schema::update_item_stage_progress(&conn, item_id, "EMBEDDING", Some("EXTRACTING_FRAMES"), 40.0).unwrap();

        fs::write(dir.path().join("x.mp4"), b"a completely different version").unwrap();
        let report = scan_library(&conn, &library).unwrap();

        assert_eq!(report.files_changed, 1);
        let item = schema::get_item(&conn, item_id).unwrap().unwrap();
        assert_eq!(item.status, "QUEUED");
    }

    #[test]
    fn deleted_file_removes_item() {
        let conn = open_memory().unwrap();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.mp4"), b"bytes").unwrap();
        let library = make_library(&conn, dir.path());
        scan_library(&conn, &library).unwrap();

        fs::remove_file(dir.path().join("x.mp4")).unwrap();
        let report = scan_library(&conn, &library).unwrap();

        assert_eq!(report.files_deleted, 1);
        assert!(schema::list_items(&conn, Some(library.id), None, 10, 0).unwrap().is_empty());
    }
}
