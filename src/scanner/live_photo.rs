// Live-photo pairing: an iPhone-style still plus a short companion clip
// sharing a filename stem. Detected after every scan so newly discovered
// halves of a pair link up regardless of discovery order.

use crate::constants::LIVE_PHOTO_MAX_VIDEO_SECS;
use crate::error::Result;
use crate::store::schema;
use rusqlite::Connection;
use std::path::Path;

/// Find `{still, video}` pairs sharing a filename stem within a library and
/// link them via `live_pair_id`, marking the video half
/// `is_live_component=true` so it can be hidden from the main grid.
pub fn pair_live_photos(conn: &Connection, library_id: i64) -> Result<()> {
    let items = schema::list_items(conn, Some(library_id), None, i64::MAX, 0)?;

    for still in items.iter().filter(|i| i.media_type == "photo") {
        if still.live_pair_id.is_some() {
            continue;
        }
        let Some(stem) = stem_of(&still.path) else { continue };

        let Some(video) = items.iter().find(|candidate| {
            candidate.media_type == "video"
                && candidate.live_pair_id.is_none()
                && stem_of(&candidate.path).as_deref() == Some(stem.as_str())
                && candidate
                    .duration_ms
                    .map(|d| (d as f64 / 1000.0) <= LIVE_PHOTO_MAX_VIDEO_SECS)
                    .unwrap_or(false)
        }) else {
            continue;
        };

        schema::set_live_pair(conn, still.id, video.id)?;
        tracing::debug!(still_id = still.id, video_id = video.id, "paired live photo");
    }

    Ok(())
}

fn stem_of(path: &str) -> Option<String> {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{open_memory, schema::NewItem};

    #[test]
    fn pairs_still_and_short_clip_sharing_a_stem() {
        let conn = open_memory().unwrap();
        let lib_id = schema::insert_library(&conn, "/tmp/lib", "Lib", true).unwrap();

        let still_id = schema::insert_item(
            &conn,
            &NewItem {
                library_id: lib_id,
                path: "IMG_0001.HEIC".into(),
                filename: "IMG_0001.HEIC".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp1".into(),
                media_type: "photo".into(),
            },
        )
        .unwrap();

        let video_id = schema::insert_item(
            &conn,
            &NewItem {
                library_id: lib_id,
                path: "IMG_0001.MOV".into(),
                filename: "IMG_0001.MOV".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp2".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        conn.execute(
            "UPDATE items SET duration_ms = 3000 WHERE id = ?1",
            rusqlite::params![video_id],
        )
        .unwrap();

        pair_live_photos(&conn, lib_id).unwrap();

        let still = schema::get_item(&conn, still_id).unwrap().unwrap();
        let video = schema::get_item(&conn, video_id).unwrap().unwrap();
        assert_eq!(still.live_pair_id, Some(video_id));
        assert_eq!(video.live_pair_id, Some(still_id));
        assert!(video.is_live_component);
    }

    #[test]
    fn does_not_pair_clip_longer_than_five_seconds() {
        let conn = open_memory().unwrap();
        let lib_id = schema::insert_library(&conn, "/tmp/lib", "Lib", true).unwrap();

        schema::insert_item(
            &conn,
            &NewItem {
                library_id: lib_id,
                path: "IMG_0002.HEIC".into(),
                filename: "IMG_0002.HEIC".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp3".into(),
                media_type: "photo".into(),
            },
        )
        .unwrap();
        let video_id = schema::insert_item(
            &conn,
            &NewItem {
                library_id: lib_id,
                path: "IMG_0002.MOV".into(),
                filename: "IMG_0002.MOV".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp4".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        conn.execute(
            "UPDATE items SET duration_ms = 12000 WHERE id = ?1",
            rusqlite::params![video_id],
        )
        .unwrap();

        pair_live_photos(&conn, lib_id).unwrap();

        let video = schema::get_item(&conn, video_id).unwrap().unwrap();
        assert!(video.live_pair_id.is_none());
    }
}
