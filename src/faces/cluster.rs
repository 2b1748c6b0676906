// Greedy agglomerative clustering over unassigned faces (spec §4.6): faces
// with no person assignment are grouped so a reviewer can label a whole
// cluster at once instead of one face at a time.

use crate::constants::FACE_CLUSTER_THRESHOLD;
use crate::error::Result;
use crate::store::schema::{self, Face};
use crate::store::vector_shard::cosine_similarity;
use rusqlite::Connection;
use uuid::Uuid;

/// Re-cluster every currently unassigned face. Idempotent: faces that
/// already belong to a stable cluster typically land back in an equivalent
/// group, though cluster ids themselves are not stable across runs.
pub fn recluster_unassigned(conn: &Connection) -> Result<usize> {
    let faces: Vec<Face> = schema::list_unassigned_faces(conn)?
        .into_iter()
        .filter(|f| !f.embedding.is_empty())
        .collect();

    let clusters = greedy_cluster(&faces, FACE_CLUSTER_THRESHOLD);
    let mut clustered = 0;
    for group in clusters.iter().filter(|g| g.len() > 1) {
        let cluster_id = Uuid::new_v4().to_string();
        for &idx in group {
            schema::set_face_cluster(conn, faces[idx].id, &cluster_id)?;
            clustered += 1;
        }
    }
    Ok(clustered)
}

/// Single-linkage greedy clustering: walk faces in order, attach each to the
/// first existing cluster whose members it's similar enough to on average,
/// else start a new one. O(n^2) but n is "faces with no assigned person",
/// which stays small in practice.
fn greedy_cluster(faces: &[Face], threshold: f32) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..faces.len() {
        let mut best_cluster: Option<usize> = None;
        let mut best_similarity = threshold;

        for (c, members) in clusters.iter().enumerate() {
            let avg_similarity: f32 = members
                .iter()
                .map(|&m| cosine_similarity(&faces[i].embedding, &faces[m].embedding))
                .sum::<f32>()
                / members.len() as f32;
            if avg_similarity >= best_similarity {
                best_similarity = avg_similarity;
                best_cluster = Some(c);
            }
        }

        match best_cluster {
            Some(c) => clusters[c].push(i),
            None => clusters.push(vec![i]),
        }
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    fn insert(conn: &Connection, item_id: i64, embedding: Vec<f32>) -> i64 {
        schema::insert_face(conn, item_id, 1, 0, [0.0, 0.0, 0.1, 0.1], 0.9, &embedding, None).unwrap()
    }

    #[test]
    fn near_identical_faces_end_up_in_the_same_cluster() {
        let conn = open_memory().unwrap();
        let a = insert(&conn, 1, vec![1.0, 0.0, 0.0]);
        let b = insert(&conn, 2, vec![0.98, 0.02, 0.0]);
        let c = insert(&conn, 3, vec![0.0, 1.0, 0.0]);

        recluster_unassigned(&conn).unwrap();

        let face_a = schema::get_face(&conn, a).unwrap().unwrap();
        let face_b = schema::get_face(&conn, b).unwrap().unwrap();
        let face_c = schema::get_face(&conn, c).unwrap().unwrap();

        assert!(face_a.cluster_id.is_some());
        assert_eq!(face_a.cluster_id, face_b.cluster_id);
        assert_ne!(face_a.cluster_id, face_c.cluster_id);
    }

    #[test]
    fn singleton_faces_stay_unclustered() {
        let conn = open_memory().unwrap();
        insert(&conn, 1, vec![1.0, 0.0, 0.0]);
        insert(&conn, 2, vec![0.0, 1.0, 0.0]);
        insert(&conn, 3, vec![0.0, 0.0, 1.0]);

        let clustered = recluster_unassigned(&conn).unwrap();
        assert_eq!(clustered, 0);
    }
}
