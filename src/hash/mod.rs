// Content fingerprinting using BLAKE3.
//
// The scanner identifies files by content rather than path: two files with the
// same fingerprint are the same media item even if moved or renamed. Fingerprint
// format: "blake3:<FINGERPRINT_SCHEME>:<hex>".

use crate::constants::{FINGERPRINT_CHUNK_SIZE, FINGERPRINT_SCHEME};
use crate::error::{EngineError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Compute the content fingerprint used for dedup and relinking: first 64 KiB +
/// last 64 KiB + file size, hashed together. Cheap to compute even for
/// multi-gigabyte video files since it never reads the whole file.
pub fn compute_fingerprint(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).map_err(|e| EngineError::FileNotFound(format!("{}: {}", path.display(), e)))?;

    let file_size = file.metadata()?.len();

    let mut hasher = blake3::Hasher::new();

    let head_len = FINGERPRINT_CHUNK_SIZE.min(file_size as usize);
    let mut head = vec![0u8; head_len];
    file.read_exact(&mut head)?;
    hasher.update(&head);

    if file_size > FINGERPRINT_CHUNK_SIZE as u64 {
        let tail_offset = file_size.saturating_sub(FINGERPRINT_CHUNK_SIZE as u64);
        file.seek(SeekFrom::Start(tail_offset))?;

        let mut tail = vec![0u8; FINGERPRINT_CHUNK_SIZE];
        file.read_exact(&mut tail)?;
        hasher.update(&tail);
    }

    hasher.update(&file_size.to_le_bytes());

    let hash = hasher.finalize();
    Ok(format!("blake3:{}:{}", FINGERPRINT_SCHEME, hash.to_hex()))
}

/// Compute the full BLAKE3 hash of an entire file. Used when a fingerprint
/// collision needs to be disambiguated by full-content comparison.
pub fn compute_full_hash(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).map_err(|e| EngineError::FileNotFound(format!("{}: {}", path.display(), e)))?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; FINGERPRINT_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("blake3:full:{}", hash.to_hex()))
}

/// Compute a full BLAKE3 hash from an in-memory byte slice, e.g. for hashing
/// serialized backup manifests.
pub fn compute_full_hash_from_bytes(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:full:{}", hash.to_hex())
}

/// Re-fingerprint a file and compare against a stored value.
pub fn verify_fingerprint(path: &Path, expected: &str) -> Result<bool> {
    let actual = compute_fingerprint(path)?;
    Ok(actual == expected)
}

/// A coarse fallback fingerprint (size + duration) used to propose relink
/// candidates when a file's content fingerprint can no longer be found at any
/// known path (e.g. the original was deleted and a re-encoded copy took its place).
pub fn compute_size_duration_fingerprint(size_bytes: i64, duration_ms: Option<i64>) -> String {
    match duration_ms {
        Some(d) => format!("size_duration:{}:{}", size_bytes, d),
        None => format!("size_duration:{}:0", size_bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn fingerprint_small_file_uses_scheme_tag() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();

        let fp = compute_fingerprint(file.path()).unwrap();
        assert!(fp.starts_with("blake3:head_tail_size_v1:"));
    }

    #[test]
    fn fingerprint_is_stable_across_calls() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; 200_000]).unwrap();

        let a = compute_fingerprint(file.path()).unwrap();
        let b = compute_fingerprint(file.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let mut file_a = NamedTempFile::new().unwrap();
        file_a.write_all(b"content a").unwrap();
        let mut file_b = NamedTempFile::new().unwrap();
        file_b.write_all(b"content b").unwrap();

        assert_ne!(
            compute_fingerprint(file_a.path()).unwrap(),
            compute_fingerprint(file_b.path()).unwrap()
        );
    }

    #[test]
    fn full_hash_has_full_tag() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();

        let hash = compute_full_hash(file.path()).unwrap();
        assert!(hash.starts_with("blake3:full:"));
    }

    #[test]
    fn verify_fingerprint_detects_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"original").unwrap();
        let fp = compute_fingerprint(file.path()).unwrap();

        assert!(verify_fingerprint(file.path(), &fp).unwrap());
        assert!(!verify_fingerprint(file.path(), "blake3:head_tail_size_v1:deadbeef").unwrap());
    }
}
