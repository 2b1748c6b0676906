// Face Learner (spec §4.6): centroid-based auto-recognition, pair-threshold
// disambiguation between confusable people, greedy clustering of unassigned
// faces, and the correction operations the review queue drives.

pub mod cluster;

use crate::constants::{
    CENTROID_WEIGHT_AUTO, CENTROID_WEIGHT_MANUAL, CENTROID_WEIGHT_REFERENCE, FACE_AUTO_ACCEPT_FLOOR,
    FACE_NEGATIVE_TOLERANCE_DEFAULT,
};
use crate::error::Result;
use crate::store::schema::{self, Face, Person};
use rusqlite::Connection;

/// Per-face weight in a person's centroid, keyed by how the face was
/// assigned. Reference examples count most, manual corrections next, model
/// auto-assignments least — so one deliberate correction outweighs several
/// uncertain automatic ones (spec §4.6 centroid weighting).
fn face_weight(face: &Face) -> f64 {
    match face.assignment_source.as_deref() {
        Some("reference") => CENTROID_WEIGHT_REFERENCE as f64,
        Some("manual") => CENTROID_WEIGHT_MANUAL as f64,
        _ => CENTROID_WEIGHT_AUTO as f64,
    }
}

fn mean_embedding(faces: &[&Face], weights: &[f64]) -> Option<Vec<f32>> {
    let dim = faces.first()?.embedding.len();
    if dim == 0 {
        return None;
    }
    let mut sum = vec![0.0f64; dim];
    let mut total_weight = 0.0f64;
    for (face, &w) in faces.iter().zip(weights) {
        if face.embedding.len() != dim {
            continue;
        }
        for (i, v) in face.embedding.iter().enumerate() {
            sum[i] += *v as f64 * w;
        }
        total_weight += w;
    }
    if total_weight <= 0.0 {
        return None;
    }
    Some(sum.iter().map(|v| (v / total_weight) as f32).collect())
}

/// Compute a person's centroid embedding per their `recognition_mode`.
/// Returns `None` if the person has no usable faces yet.
pub fn person_centroid(conn: &Connection, person: &Person) -> Result<Option<Vec<f32>>> {
    let faces = schema::list_faces_for_person(conn, person.id)?;
    if faces.is_empty() {
        return Ok(None);
    }

    match person.recognition_mode.as_str() {
        "reference_only" => {
            let reference: Vec<&Face> = faces
                .iter()
                .filter(|f| f.assignment_source.as_deref() == Some("reference"))
                .collect();
            if reference.is_empty() {
                // No reference face marked yet — fall back to the weighted
                // centroid rather than refusing to recognize at all.
                let refs: Vec<&Face> = faces.iter().collect();
                let weights: Vec<f64> = refs.iter().map(|f| face_weight(f)).collect();
                Ok(mean_embedding(&refs, &weights))
            } else {
                let weights = vec![1.0; reference.len()];
                Ok(mean_embedding(&reference, &weights))
            }
        }
        "average" => {
            // Weights every sample by source (reference=3, manual=2, auto=1).
            let refs: Vec<&Face> = faces.iter().collect();
            let weights: Vec<f64> = refs.iter().map(|f| face_weight(f)).collect();
            Ok(mean_embedding(&refs, &weights))
        }
        "weighted" => {
            // Same source weighting as average, with an extra multiplier on
            // reference faces so the centroid biases toward them.
            let refs: Vec<&Face> = faces.iter().collect();
            let weights: Vec<f64> = refs
                .iter()
                .map(|f| {
                    let w = face_weight(f);
                    if f.assignment_source.as_deref() == Some("reference") {
                        w * CENTROID_WEIGHT_REFERENCE as f64
                    } else {
                        w
                    }
                })
                .collect();
            Ok(mean_embedding(&refs, &weights))
        }
        _ => {
            let refs: Vec<&Face> = faces.iter().collect();
            let weights: Vec<f64> = refs.iter().map(|f| face_weight(f)).collect();
            Ok(mean_embedding(&refs, &weights))
        }
    }
}

struct Candidate {
    person_id: i64,
    similarity: f64,
}

/// Is `embedding` too close to any face recorded as a negative example for
/// `person_id` to be trusted as that person (spec §4.6: exclude when
/// similarity to a negative example clears the person's negative-tolerance,
/// default 0.70)? Checked in addition to the exact-face negative lookup so a
/// brand-new face that merely *looks like* a known mistake is also excluded,
/// not just a face that was itself previously corrected away.
fn too_similar_to_a_negative(conn: &Connection, person_id: i64, embedding: &[f32]) -> Result<bool> {
    for negative in schema::list_negative_example_faces(conn, person_id)? {
        if negative.embedding.is_empty() {
            continue;
        }
        let similarity = crate::store::vector_shard::cosine_similarity(embedding, &negative.embedding);
        if similarity as f64 >= FACE_NEGATIVE_TOLERANCE_DEFAULT as f64 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Score `embedding` against every person who has not recorded this face (or
/// a look-alike) as a negative example, sorted best match first.
fn rank_candidates(conn: &Connection, face_id: i64, embedding: &[f32]) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for person in schema::list_persons(conn)? {
        if schema::is_negative_for(conn, face_id, person.id)? {
            continue;
        }
        if too_similar_to_a_negative(conn, person.id, embedding)? {
            continue;
        }
        let Some(centroid) = person_centroid(conn, &person)? else {
            continue;
        };
        let similarity = crate::store::vector_shard::cosine_similarity(embedding, &centroid) as f64;
        candidates.push(Candidate { person_id: person.id, similarity });
    }
    candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    Ok(candidates)
}

/// Attempt to auto-assign a newly detected face to an existing person (spec
/// §4.6 "immediate auto-recognition"). A face only auto-accepts when its top
/// match clears the floor *and*, when a runner-up exists, clears the
/// pair-specific threshold between the two candidates — this is what lets
/// two easily-confused people (e.g. siblings) require a higher bar than the
/// global floor once a human has corrected a mix-up between them.
pub fn try_auto_recognize(conn: &Connection, face_id: i64) -> Result<()> {
    let face = match schema::get_face(conn, face_id)? {
        Some(f) => f,
        None => return Ok(()),
    };
    if face.embedding.is_empty() {
        return Ok(());
    }

    let candidates = rank_candidates(conn, face_id, &face.embedding)?;
    let Some(top) = candidates.first() else {
        return Ok(());
    };
    if top.similarity < FACE_AUTO_ACCEPT_FLOOR as f64 {
        return Ok(());
    }

    if let Some(second) = candidates.get(1) {
        let pair_threshold = schema::get_pair_threshold(conn, top.person_id, second.person_id)?;
        if top.similarity < pair_threshold {
            // Too close to call between two candidates; leave for clustering
            // / the review queue rather than risk misassigning.
            return Ok(());
        }
    }

    schema::assign_face(conn, face_id, Some(top.person_id), "auto", Some(top.similarity))?;
    schema::recompute_person_face_count(conn, top.person_id)?;
    Ok(())
}

/// User correction: assign a face to a person, recording a negative example
/// for any person it was previously (wrongly) assigned to and bumping the
/// pair threshold between the old and new person so the same confusion is
/// harder to repeat (spec §4.6 "pair thresholds ratchet up on correction").
pub fn assign_to_person(conn: &Connection, face_id: i64, person_id: i64) -> Result<()> {
    let face = schema::get_face(conn, face_id)?.ok_or(crate::error::EngineError::FaceNotFound(face_id))?;

    if let Some(previous_person_id) = face.person_id {
        if previous_person_id != person_id {
            schema::add_face_example(conn, face_id, previous_person_id, "negative")?;
            schema::bump_pair_threshold(conn, previous_person_id, person_id)?;
            schema::recompute_person_face_count(conn, previous_person_id)?;
        }
    }

    schema::assign_face(conn, face_id, Some(person_id), "manual", Some(1.0))?;
    schema::recompute_person_face_count(conn, person_id)?;
    Ok(())
}

/// Mark a face as an explicit reference example for a person — the highest-
/// weighted input to that person's centroid.
pub fn mark_reference(conn: &Connection, face_id: i64, person_id: i64) -> Result<()> {
    schema::assign_face(conn, face_id, Some(person_id), "reference", Some(1.0))?;
    schema::add_face_example(conn, face_id, person_id, "reference")?;
    schema::recompute_person_face_count(conn, person_id)?;
    Ok(())
}

/// Record that a face is definitely *not* this person, without assigning it
/// anywhere. Excludes the person from future auto-recognition candidates for
/// this exact face.
pub fn mark_negative(conn: &Connection, face_id: i64, person_id: i64) -> Result<()> {
    schema::add_face_example(conn, face_id, person_id, "negative")
}

pub fn create_person(conn: &Connection, name: &str) -> Result<i64> {
    schema::insert_person(conn, name)
}

/// Merge `from` into `to`: reassign every face, then delete `from`. The
/// thumbnail pointer is cleared before the merge commits and recomputed
/// after, so a crash mid-merge never leaves `to`'s thumbnail referencing a
/// face that `from`'s deletion could otherwise orphan.
pub fn merge_persons(conn: &Connection, from: i64, to: i64) -> Result<()> {
    schema::set_person_thumbnail(conn, to, None)?;
    schema::reassign_all_faces(conn, from, to)?;
    schema::delete_person(conn, from)?;
    schema::recompute_person_face_count(conn, to)?;

    if let Some(face) = schema::list_faces_for_person(conn, to)?.into_iter().max_by(|a, b| {
        a.assignment_confidence
            .unwrap_or(0.0)
            .partial_cmp(&b.assignment_confidence.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        schema::set_person_thumbnail(conn, to, Some(face.id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    fn insert_test_face(conn: &Connection, item_id: i64, embedding: Vec<f32>) -> i64 {
        schema::insert_face(conn, item_id, 1, 0, [0.0, 0.0, 0.1, 0.1], 0.9, &embedding, None).unwrap()
    }

    #[test]
    fn face_with_no_existing_people_stays_unassigned() {
        let conn = open_memory().unwrap();
        let face_id = insert_test_face(&conn, 1, vec![1.0, 0.0, 0.0]);
        try_auto_recognize(&conn, face_id).unwrap();
        let face = schema::get_face(&conn, face_id).unwrap().unwrap();
        assert!(face.person_id.is_none());
    }

    #[test]
    fn clear_match_above_floor_auto_assigns() {
        let conn = open_memory().unwrap();
        let person_id = create_person(&conn, "Alice").unwrap();
        let reference_face = insert_test_face(&conn, 1, vec![1.0, 0.0, 0.0]);
        mark_reference(&conn, reference_face, person_id).unwrap();

        let new_face = insert_test_face(&conn, 2, vec![1.0, 0.0, 0.0]);
        try_auto_recognize(&conn, new_face).unwrap();

        let face = schema::get_face(&conn, new_face).unwrap().unwrap();
        assert_eq!(face.person_id, Some(person_id));
        assert_eq!(face.assignment_source.as_deref(), Some("auto"));
    }

    #[test]
    fn negative_example_excludes_person_from_matching() {
        let conn = open_memory().unwrap();
        let person_id = create_person(&conn, "Alice").unwrap();
        let reference_face = insert_test_face(&conn, 1, vec![1.0, 0.0, 0.0]);
        mark_reference(&conn, reference_face, person_id).unwrap();

        let new_face = insert_test_face(&conn, 2, vec![1.0, 0.0, 0.0]);
        mark_negative(&conn, new_face, person_id).unwrap();
        try_auto_recognize(&conn, new_face).unwrap();

        let face = schema::get_face(&conn, new_face).unwrap().unwrap();
        assert!(face.person_id.is_none());
    }

    #[test]
    fn lookalike_of_a_negative_example_is_also_excluded() {
        let conn = open_memory().unwrap();
        let person_id = create_person(&conn, "Alice").unwrap();
        let reference_face = insert_test_face(&conn, 1, vec![1.0, 0.0, 0.0]);
        mark_reference(&conn, reference_face, person_id).unwrap();

        // A face the user already rejected for Alice...
        let rejected_face = insert_test_face(&conn, 2, vec![0.9, 0.1, 0.0]);
        mark_negative(&conn, rejected_face, person_id).unwrap();

        // ...and a brand-new face that was never itself marked negative, but
        // whose embedding is nearly identical to the rejected one.
        let lookalike = insert_test_face(&conn, 3, vec![0.9, 0.1, 0.0]);
        try_auto_recognize(&conn, lookalike).unwrap();

        let face = schema::get_face(&conn, lookalike).unwrap().unwrap();
        assert!(face.person_id.is_none());
    }

    #[test]
    fn weighted_mode_biases_further_toward_references_than_average() {
        let conn = open_memory().unwrap();
        let person_id = create_person(&conn, "Alice").unwrap();
        let reference_face = insert_test_face(&conn, 1, vec![1.0, 0.0, 0.0]);
        mark_reference(&conn, reference_face, person_id).unwrap();
        let auto_face = insert_test_face(&conn, 2, vec![0.0, 1.0, 0.0]);
        schema::assign_face(&conn, auto_face, Some(person_id), "auto", Some(0.8)).unwrap();

        schema::set_person_recognition_mode(&conn, person_id, "average").unwrap();
        let person = schema::get_person(&conn, person_id).unwrap().unwrap();
        let average_centroid = person_centroid(&conn, &person).unwrap().unwrap();

        schema::set_person_recognition_mode(&conn, person_id, "weighted").unwrap();
        let person = schema::get_person(&conn, person_id).unwrap().unwrap();
        let weighted_centroid = person_centroid(&conn, &person).unwrap().unwrap();

        assert!(weighted_centroid[0] > average_centroid[0]);
    }

    #[test]
    fn manual_correction_bumps_pair_threshold_between_old_and_new() {
        let conn = open_memory().unwrap();
        let alice = create_person(&conn, "Alice").unwrap();
        let bob = create_person(&conn, "Bob").unwrap();
        let face_id = insert_test_face(&conn, 1, vec![1.0, 0.0, 0.0]);
        schema::assign_face(&conn, face_id, Some(alice), "auto", Some(0.7)).unwrap();

        assign_to_person(&conn, face_id, bob).unwrap();

        let threshold = schema::get_pair_threshold(&conn, alice, bob).unwrap();
        assert!(threshold > crate::constants::PAIR_THRESHOLD_MIN as f64);
        assert!(schema::is_negative_for(&conn, face_id, alice).unwrap());
    }

    #[test]
    fn merge_persons_moves_all_faces_and_clears_source() {
        let conn = open_memory().unwrap();
        let alice = create_person(&conn, "Alice").unwrap();
        let alice2 = create_person(&conn, "Alice (dup)").unwrap();
        let face_id = insert_test_face(&conn, 1, vec![1.0, 0.0, 0.0]);
        schema::assign_face(&conn, face_id, Some(alice2), "manual", Some(1.0)).unwrap();

        merge_persons(&conn, alice2, alice).unwrap();

        let face = schema::get_face(&conn, face_id).unwrap().unwrap();
        assert_eq!(face.person_id, Some(alice));
        assert!(schema::get_person(&conn, alice2).unwrap().is_none());
    }
}
