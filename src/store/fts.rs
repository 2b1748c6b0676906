// BM25-ranked full-text matching over transcript segments.

use crate::error::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptMatch {
    pub item_id: i64,
    pub segment_id: i64,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    /// Raw BM25 score (more negative is a better match, per SQLite's fts5 convention).
    pub bm25: f64,
}

/// Match `query` against transcript segments via fts5's BM25 ranking,
/// optionally restricted to a library.
pub fn match_transcript(conn: &Connection, query: &str, library_id: Option<i64>, limit: i64) -> Result<Vec<TranscriptMatch>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT s.item_id, s.id, s.start_ms, s.end_ms, s.text, bm25(transcript_segments_fts) AS rank
         FROM transcript_segments_fts f
         JOIN transcript_segments s ON s.id = f.rowid
         JOIN items i ON i.id = s.item_id
         WHERE transcript_segments_fts MATCH ?1",
    );
    if library_id.is_some() {
        sql.push_str(" AND i.library_id = ?2");
    }
    sql.push_str(" ORDER BY rank LIMIT ?3");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![query, library_id.unwrap_or(0), limit], |row| {
        Ok(TranscriptMatch {
            item_id: row.get(0)?,
            segment_id: row.get(1)?,
            start_ms: row.get(2)?,
            end_ms: row.get(3)?,
            text: row.get(4)?,
            bm25: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Normalize BM25 scores (which run negative, more negative = better) to
/// [0, 1] within the result set via min-max over their absolute magnitude.
pub fn normalize_scores(matches: &[TranscriptMatch]) -> Vec<f64> {
    if matches.is_empty() {
        return Vec::new();
    }
    let mags: Vec<f64> = matches.iter().map(|m| -m.bm25).collect();
    let min = mags.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = mags.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![1.0; matches.len()];
    }
    mags.iter().map(|m| (m - min) / (max - min)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{open_memory, schema};

    #[test]
    fn matches_inserted_segment_text() {
        let conn = open_memory().unwrap();
        let lib_id = schema::insert_library(&conn, "/tmp/clips", "Clips", true).unwrap();
        let item_id = schema::insert_item(
            &conn,
            &schema::NewItem {
                library_id: lib_id,
                path: "hello.mp4".into(),
                filename: "hello.mp4".into(),
                size: 1,
                mtime: "now".into(),
                fingerprint: "fp".into(),
                media_type: "video".into(),
            },
        )
        .unwrap();
        schema::insert_transcript_segment(&conn, item_id, 0, 1000, "hello world", Some(0.9)).unwrap();

        let matches = match_transcript(&conn, "hello", None, 10).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].item_id, item_id);
    }

    #[test]
    fn empty_query_returns_no_matches() {
        let conn = open_memory().unwrap();
        assert!(match_transcript(&conn, "", None, 10).unwrap().is_empty());
    }

    #[test]
    fn normalize_scores_handles_single_match() {
        let m = vec![TranscriptMatch {
            item_id: 1,
            segment_id: 1,
            start_ms: 0,
            end_ms: 1,
            text: "x".into(),
            bm25: -1.0,
        }];
        assert_eq!(normalize_scores(&m), vec![1.0]);
    }
}
