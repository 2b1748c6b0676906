// Searcher (spec §4.5): fuses transcript BM25 matches with visual similarity
// search, applies detector/color boosts from recognized query tokens, and
// supports filtering results down to moments a specific person appears in.

pub mod captions;

use crate::config::Config;
use crate::constants::{
    COLOR_BOOST, DEFAULT_PERSON_FILTER_WINDOW_MS, DEFAULT_SEARCH_PAGE_SIZE, DETECTOR_BOOST_MAX,
    DETECTOR_BOOST_PER_LABEL, DETECTOR_BOOST_WINDOW_MS, TRANSCRIPT_FUSION_WEIGHT, TRANSCRIPT_MOMENT_WINDOW_MS,
    VISUAL_FUSION_WEIGHT, VISUAL_MOMENT_WINDOW_MS, VISUAL_SIMILARITY_THRESHOLD, VISUAL_TOP_K_PER_ITEM,
};
use crate::error::Result;
use crate::pipeline::ml::ModelBundle;
use crate::store::schema::{self, Frame};
use crate::store::vector_shard;
use crate::store::{fts, schema::Item};
use crate::vocab;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Transcript,
    Visual,
    Both,
}

pub struct SearchQuery {
    pub text: String,
    pub library_id: Option<i64>,
    pub person_id: Option<i64>,
    pub mode: SearchMode,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub item_id: i64,
    pub timestamp_ms: i64,
    pub score: f64,
    pub match_sources: Vec<String>,
    pub snippet: Option<String>,
    pub thumbnail: Option<String>,
    pub matched_labels: Vec<String>,
    pub matched_persons: Vec<i64>,
}

struct Moment {
    item_id: i64,
    timestamp_ms: i64,
    transcript_score: f64,
    visual_score: f64,
    snippet: Option<String>,
    sources: Vec<String>,
}

/// Split a query into the recognized color/object vocabulary tokens it
/// contains (used for boosts and the label-only path) and the remaining
/// text with those tokens stripped out, used for transcript/visual
/// matching so a query like "red car" doesn't force a literal search for
/// the word "red" against the transcript.
fn extract_recognized_tokens(text: &str) -> (Vec<&'static str>, Vec<&'static str>, String) {
    let mut colors = Vec::new();
    let mut labels = Vec::new();
    let mut remaining = Vec::new();
    for token in text.split_whitespace() {
        let cleaned = token.trim_matches(|c: char| !c.is_alphanumeric());
        let mut recognized = false;
        if let Some(c) = vocab::resolve_color(cleaned) {
            if !colors.contains(&c) {
                colors.push(c);
            }
            recognized = true;
        }
        if let Some(l) = vocab::resolve_object_label(cleaned) {
            if !labels.contains(&l) {
                labels.push(l);
            }
            recognized = true;
        }
        if !recognized {
            remaining.push(token);
        }
    }
    (colors, labels, remaining.join(" "))
}

pub fn search(conn: &Connection, config: &Config, models: &ModelBundle, query: &SearchQuery) -> Result<Vec<SearchResult>> {
    let (colors, labels, text_query) = extract_recognized_tokens(&query.text);
    let limit = if query.limit > 0 { query.limit } else { DEFAULT_SEARCH_PAGE_SIZE };

    let mut moments: Vec<Moment> = Vec::new();

    if matches!(query.mode, SearchMode::Transcript | SearchMode::Both) && !text_query.trim().is_empty() {
        let transcript_matches = fts::match_transcript(conn, &text_query, query.library_id, limit * 4)?;
        let normalized = fts::normalize_scores(&transcript_matches);
        for (m, score) in transcript_matches.iter().zip(normalized) {
            moments.push(Moment {
                item_id: m.item_id,
                timestamp_ms: m.start_ms,
                transcript_score: score,
                visual_score: 0.0,
                snippet: Some(m.text.clone()),
                sources: vec!["transcript".to_string()],
            });
        }
    }

    if matches!(query.mode, SearchMode::Visual | SearchMode::Both) && !text_query.trim().is_empty() {
        let query_vector = models.visual_embedder.embed_text(&text_query)?;
        for item in candidate_items(conn, query.library_id)? {
            if !vector_shard::shard_exists(&config.shards_dir(), item.id) {
                continue;
            }
            let shard = vector_shard::read_shard(&config.shards_dir(), item.id)?;
            let frames = schema::list_frames(conn, item.id)?;
            for (frame_index, similarity) in vector_shard::top_k(&shard, &query_vector, VISUAL_TOP_K_PER_ITEM) {
                if (similarity as f64) < VISUAL_SIMILARITY_THRESHOLD {
                    continue;
                }
                let Some(frame) = frames.iter().find(|f| f.frame_index == frame_index as i64) else {
                    continue;
                };
                moments.push(Moment {
                    item_id: item.id,
                    timestamp_ms: frame.timestamp_ms,
                    transcript_score: 0.0,
                    visual_score: similarity as f64,
                    snippet: None,
                    sources: vec!["visual".to_string()],
                });
            }
        }
    }

    // Label-only path: once the recognized tokens are stripped out there's
    // no text left to match against transcript or visual embeddings, so
    // fall back to every item the recognized object labels were detected in.
    if text_query.trim().is_empty() && !labels.is_empty() {
        for label in &labels {
            for detection in schema::detections_for_label(conn, label, query.library_id)? {
                moments.push(Moment {
                    item_id: detection.item_id,
                    timestamp_ms: detection.timestamp_ms,
                    transcript_score: 0.0,
                    visual_score: detection.confidence,
                    snippet: None,
                    sources: vec!["label".to_string()],
                });
            }
        }
    }

    let grouped = group_moments(moments);
    let mut results = Vec::new();
    for moment in grouped {
        let detector_boost = compute_detector_boost(conn, moment.item_id, moment.timestamp_ms, &labels)?;
        let color_boost = compute_color_boost(conn, moment.item_id, moment.timestamp_ms, &colors)?;

        let matched_persons = if query.person_id.is_some() || true {
            persons_near(conn, moment.item_id, moment.timestamp_ms)?
        } else {
            Vec::new()
        };

        if let Some(person_id) = query.person_id {
            if !matched_persons.contains(&person_id) {
                continue;
            }
        }

        let base = moment.transcript_score * TRANSCRIPT_FUSION_WEIGHT + moment.visual_score * VISUAL_FUSION_WEIGHT;
        let score = (base + detector_boost + color_boost).min(1.0);

        results.push(SearchResult {
            item_id: moment.item_id,
            timestamp_ms: moment.timestamp_ms,
            score,
            match_sources: moment.sources,
            snippet: moment.snippet,
            thumbnail: Some(config.thumbs_dir().join(format!("{}.jpg", moment.item_id)).to_string_lossy().to_string()),
            matched_labels: labels.iter().map(|s| s.to_string()).collect(),
            matched_persons,
        });
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit as usize);
    Ok(results)
}

fn candidate_items(conn: &Connection, library_id: Option<i64>) -> Result<Vec<Item>> {
    schema::list_items(conn, library_id, Some("DONE"), 10_000, 0)
}

/// Merge transcript and visual hits that land close together in the same
/// item into a single moment (spec §4.5 moment grouping windows).
fn group_moments(mut moments: Vec<Moment>) -> Vec<Moment> {
    moments.sort_by_key(|m| (m.item_id, m.timestamp_ms));
    let mut grouped: Vec<Moment> = Vec::new();

    for moment in moments {
        let window = if moment.sources.contains(&"transcript".to_string()) {
            TRANSCRIPT_MOMENT_WINDOW_MS
        } else {
            VISUAL_MOMENT_WINDOW_MS
        };

        if let Some(last) = grouped.last_mut() {
            if last.item_id == moment.item_id && (moment.timestamp_ms - last.timestamp_ms).abs() <= window {
                last.transcript_score = last.transcript_score.max(moment.transcript_score);
                last.visual_score = last.visual_score.max(moment.visual_score);
                last.snippet = last.snippet.clone().or(moment.snippet);
                for s in moment.sources {
                    if !last.sources.contains(&s) {
                        last.sources.push(s);
                    }
                }
                continue;
            }
        }
        grouped.push(moment);
    }
    grouped
}

fn compute_detector_boost(conn: &Connection, item_id: i64, timestamp_ms: i64, labels: &[&str]) -> Result<f64> {
    if labels.is_empty() {
        return Ok(0.0);
    }
    let detections = schema::list_detections(conn, item_id)?;
    let matching = detections
        .iter()
        .filter(|d| {
            labels.contains(&d.label.as_str()) && (d.timestamp_ms - timestamp_ms).abs() <= DETECTOR_BOOST_WINDOW_MS
        })
        .count();
    Ok((DETECTOR_BOOST_PER_LABEL * matching as f64).min(DETECTOR_BOOST_MAX))
}

fn compute_color_boost(conn: &Connection, item_id: i64, timestamp_ms: i64, colors: &[&str]) -> Result<f64> {
    if colors.is_empty() {
        return Ok(0.0);
    }
    let frames = schema::list_frames(conn, item_id)?;
    let nearby_has_color = nearest_frame(&frames, timestamp_ms)
        .map(|f| f.colors.iter().any(|c| colors.contains(&c.as_str())))
        .unwrap_or(false);
    Ok(if nearby_has_color { COLOR_BOOST } else { 0.0 })
}

fn nearest_frame(frames: &[Frame], timestamp_ms: i64) -> Option<&Frame> {
    frames.iter().min_by_key(|f| (f.timestamp_ms - timestamp_ms).abs())
}

fn persons_near(conn: &Connection, item_id: i64, timestamp_ms: i64) -> Result<Vec<i64>> {
    let faces = schema::faces_near_timestamp(conn, item_id, timestamp_ms, DEFAULT_PERSON_FILTER_WINDOW_MS)?;
    let mut persons: Vec<i64> = faces.into_iter().filter_map(|f| f.person_id).collect();
    persons.sort_unstable();
    persons.dedup();
    Ok(persons)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_color_and_label_tokens_leaving_the_rest() {
        let (colors, labels, text_query) = extract_recognized_tokens("red car on the beach");
        assert_eq!(colors, vec!["red"]);
        assert_eq!(labels, vec!["car"]);
        assert_eq!(text_query, "on the beach");
    }

    #[test]
    fn query_that_is_entirely_recognized_tokens_leaves_an_empty_text_query() {
        let (colors, labels, text_query) = extract_recognized_tokens("red car");
        assert_eq!(colors, vec!["red"]);
        assert_eq!(labels, vec!["car"]);
        assert!(text_query.is_empty());
    }

    #[test]
    fn groups_close_moments_within_the_same_item() {
        let moments = vec![
            Moment {
                item_id: 1,
                timestamp_ms: 1000,
                transcript_score: 0.8,
                visual_score: 0.0,
                snippet: Some("hello".into()),
                sources: vec!["transcript".into()],
            },
            Moment {
                item_id: 1,
                timestamp_ms: 1500,
                transcript_score: 0.0,
                visual_score: 0.5,
                snippet: None,
                sources: vec!["visual".into()],
            },
        ];
        let grouped = group_moments(moments);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].sources.contains(&"transcript".to_string()));
        assert!(grouped[0].sources.contains(&"visual".to_string()));
    }
}
