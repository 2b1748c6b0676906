// Per-item vector shards: `<data_root>/shards/<item_id>.vec`.
//
// Format: a little-endian header `[dim: u32][count: u32]` followed by
// `count` rows of `dim` f32s, row-indexed by `Frame.index`. Written via
// temp-file + rename so a shard on disk is either absent or complete — the
// searcher never observes a partial write (spec invariant 5).

use crate::error::{EngineError, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub struct VectorShard {
    pub dim: usize,
    pub rows: Vec<Vec<f32>>,
}

pub fn shard_path(shards_dir: &Path, item_id: i64) -> PathBuf {
    shards_dir.join(format!("{}.vec", item_id))
}

/// Write a shard atomically. An empty `rows` still produces a valid
/// (zero-row) shard file, matching the "EMBEDDING is a no-op" boundary case.
pub fn write_shard(shards_dir: &Path, item_id: i64, rows: &[Vec<f32>]) -> Result<()> {
    std::fs::create_dir_all(shards_dir)?;
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);

    let final_path = shard_path(shards_dir, item_id);
    let tmp_path = final_path.with_extension("vec.tmp");

    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&(dim as u32).to_le_bytes())?;
        file.write_all(&(rows.len() as u32).to_le_bytes())?;
        for row in rows {
            if row.len() != dim {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(EngineError::EmbeddingError(
                    "inconsistent embedding dimension within shard".into(),
                ));
            }
            for value in row {
                file.write_all(&value.to_le_bytes())?;
            }
        }
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

pub fn read_shard(shards_dir: &Path, item_id: i64) -> Result<VectorShard> {
    let path = shard_path(shards_dir, item_id);
    let mut file = std::fs::File::open(&path)
        .map_err(|e| EngineError::FileNotFound(format!("{}: {}", path.display(), e)))?;

    let mut header = [0u8; 8];
    file.read_exact(&mut header)?;
    let dim = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let count = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;

    let mut rows = Vec::with_capacity(count);
    let mut buf = vec![0u8; dim * 4];
    for _ in 0..count {
        file.read_exact(&mut buf)?;
        let row: Vec<f32> = buf
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        rows.push(row);
    }

    Ok(VectorShard { dim, rows })
}

pub fn shard_exists(shards_dir: &Path, item_id: i64) -> bool {
    shard_path(shards_dir, item_id).exists()
}

pub fn delete_shard(shards_dir: &Path, item_id: i64) -> Result<()> {
    let path = shard_path(shards_dir, item_id);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Top-k most similar rows in a shard to `query`, as `(frame_index, similarity)`.
pub fn top_k(shard: &VectorShard, query: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = shard
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| (i, cosine_similarity(row, query)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn shard_round_trips() {
        let dir = tempdir().unwrap();
        let rows = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
        write_shard(dir.path(), 1, &rows).unwrap();

        assert!(shard_exists(dir.path(), 1));
        let shard = read_shard(dir.path(), 1).unwrap();
        assert_eq!(shard.dim, 3);
        assert_eq!(shard.rows, rows);
    }

    #[test]
    fn empty_shard_is_valid_and_complete() {
        let dir = tempdir().unwrap();
        write_shard(dir.path(), 2, &[]).unwrap();
        let shard = read_shard(dir.path(), 2).unwrap();
        assert_eq!(shard.rows.len(), 0);
    }

    #[test]
    fn no_partial_shard_survives_a_failed_write() {
        let dir = tempdir().unwrap();
        let rows = vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]];
        let err = write_shard(dir.path(), 3, &rows);
        assert!(err.is_err());
        assert!(!shard_exists(dir.path(), 3));
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn top_k_orders_by_similarity_descending() {
        let shard = VectorShard {
            dim: 2,
            rows: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]],
        };
        let ranked = top_k(&shard, &[1.0, 0.0], 2);
        assert_eq!(ranked[0].0, 0);
        assert_eq!(ranked[1].0, 2);
    }
}
