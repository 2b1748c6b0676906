// Transcript export as SRT/VTT captions, generated straight from the stored
// transcript segments rather than a separate caption store.

use crate::error::Result;
use crate::store::schema;
use rusqlite::Connection;

pub fn export_srt(conn: &Connection, item_id: i64) -> Result<String> {
    let segments = schema::list_transcript_segments(conn, item_id)?;
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(seg.start_ms),
            srt_timestamp(seg.end_ms),
            seg.text
        ));
    }
    Ok(out)
}

pub fn export_vtt(conn: &Connection, item_id: i64) -> Result<String> {
    let segments = schema::list_transcript_segments(conn, item_id)?;
    let mut out = String::from("WEBVTT\n\n");
    for seg in &segments {
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            vtt_timestamp(seg.start_ms),
            vtt_timestamp(seg.end_ms),
            seg.text
        ));
    }
    Ok(out)
}

fn srt_timestamp(ms: i64) -> String {
    let (h, m, s, millis) = split_ms(ms);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, millis)
}

fn vtt_timestamp(ms: i64) -> String {
    let (h, m, s, millis) = split_ms(ms);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, millis)
}

fn split_ms(ms: i64) -> (i64, i64, i64, i64) {
    let ms = ms.max(0);
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    (hours, minutes, seconds, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    #[test]
    fn srt_export_formats_timestamps_with_commas() {
        let conn = open_memory().unwrap();
        let lib = schema::insert_library(&conn, "/tmp", "lib", true).unwrap();
        let item_id = schema::insert_item(
            &conn,
            &schema::NewItem {
                library_id: lib,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        schema::insert_transcript_segment(&conn, item_id, 1000, 2500, "hello there", Some(0.9)).unwrap();

        let srt = export_srt(&conn, item_id).unwrap();
        assert!(srt.contains("00:00:01,000 --> 00:00:02,500"));
        assert!(srt.contains("hello there"));
    }

    #[test]
    fn vtt_export_starts_with_header_and_uses_dot_separator() {
        let conn = open_memory().unwrap();
        let lib = schema::insert_library(&conn, "/tmp", "lib", true).unwrap();
        let item_id = schema::insert_item(
            &conn,
            &schema::NewItem {
                library_id: lib,
                path: "a.mp4".into(),
                filename: "a.mp4".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        schema::insert_transcript_segment(&conn, item_id, 0, 500, "hi", Some(0.9)).unwrap();

        let vtt = export_vtt(&conn, item_id).unwrap();
        assert!(vtt.starts_with("WEBVTT"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:00.500"));
    }
}
