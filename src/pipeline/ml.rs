// ML module contracts.
//
// Per spec §1, the specific model families (speech recognizer, visual
// embedder, object detector, face detector/embedder) are external
// collaborators: this crate owns the pipeline that drives them, not the
// models themselves. Each is a narrow trait so a real model backend can be
// swapped in without touching stage or state-machine logic. The stub
// implementations below are deterministic and model-free; they exist so the
// pipeline is exercised end-to-end in tests and in environments with no
// model weights installed (`offline_mode`/`MODEL_MISSING` paths).

use crate::error::Result;
use std::path::Path;

/// One transcribed span of speech.
#[derive(Debug, Clone)]
pub struct TranscribedSegment {
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    pub confidence: f64,
}

pub trait Transcriber: Send + Sync {
    /// Transcribe one ≤30s audio chunk. Per-segment failures are the
    /// caller's concern (spec §4.4 stage 2): this returns `Err` only for a
    /// chunk that could not be processed at all.
    fn transcribe_chunk(&self, waveform_path: &Path, language: &str) -> Result<Vec<TranscribedSegment>>;
}

/// A fixed-dimension visual embedding, paired with the same-dimension text
/// tower used to encode free-text search queries (spec §4.5 visual path).
pub trait VisualEmbedder: Send + Sync {
    fn embed_image(&self, image_path: &Path) -> Result<Vec<f32>>;
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
    fn dim(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f64,
    pub bbox: [f64; 4],
}

pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image_path: &Path) -> Result<Vec<RawDetection>>;
}

#[derive(Debug, Clone)]
pub struct RawFace {
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub embedding: Vec<f32>,
}

pub trait FaceDetector: Send + Sync {
    fn detect_faces(&self, image_path: &Path) -> Result<Vec<RawFace>>;
}

/// The process-wide model bundle. Real backends load weights once behind a
/// load-once lock (spec §9 "global mutable state") and are handed out as
/// `Arc<dyn Trait>`; the stub bundle below has nothing to load.
pub struct ModelBundle {
    pub transcriber: Box<dyn Transcriber>,
    pub visual_embedder: Box<dyn VisualEmbedder>,
    pub object_detector: Box<dyn ObjectDetector>,
    pub face_detector: Box<dyn FaceDetector>,
}

impl ModelBundle {
    /// Deterministic, weight-free stand-ins. Swapped for a real backend by
    /// constructing a `ModelBundle` from that backend's own crate at
    /// startup; nothing else in the pipeline changes.
    pub fn stub() -> Self {
        ModelBundle {
            transcriber: Box::new(StubTranscriber),
            visual_embedder: Box::new(StubVisualEmbedder { dim: 32 }),
            object_detector: Box::new(StubObjectDetector),
            face_detector: Box::new(StubFaceDetector),
        }
    }
}

struct StubTranscriber;

impl Transcriber for StubTranscriber {
    fn transcribe_chunk(&self, waveform_path: &Path, _language: &str) -> Result<Vec<TranscribedSegment>> {
        let len = std::fs::metadata(waveform_path).map(|m| m.len()).unwrap_or(0);
        if len < crate::constants::MIN_SEGMENT_BYTES as u64 {
            return Ok(Vec::new());
        }
        Ok(vec![TranscribedSegment {
            start_ms: 0,
            end_ms: 1000,
            text: String::new(),
            confidence: 0.0,
        }])
    }
}

struct StubVisualEmbedder {
    dim: usize,
}

impl VisualEmbedder for StubVisualEmbedder {
    fn embed_image(&self, image_path: &Path) -> Result<Vec<f32>> {
        Ok(hash_to_vector(&image_path.to_string_lossy(), self.dim))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_to_vector(text, self.dim))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

struct StubObjectDetector;

impl ObjectDetector for StubObjectDetector {
    fn detect(&self, _image_path: &Path) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}

struct StubFaceDetector;

impl FaceDetector for StubFaceDetector {
    fn detect_faces(&self, _image_path: &Path) -> Result<Vec<RawFace>> {
        Ok(Vec::new())
    }
}

/// Deterministic pseudo-embedding from a seed string, normalized so cosine
/// similarity behaves sanely in tests. Not a real embedding model.
fn hash_to_vector(seed: &str, dim: usize) -> Vec<f32> {
    let hash = blake3::hash(seed.as_bytes());
    let bytes = hash.as_bytes();
    let mut v: Vec<f32> = (0..dim)
        .map(|i| {
            let b = bytes[i % bytes.len()];
            (b as f32 / 255.0) * 2.0 - 1.0
        })
        .collect();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_embedder_is_deterministic() {
        let embedder = StubVisualEmbedder { dim: 8 };
        let a = embedder.embed_text("red car").unwrap();
        let b = embedder.embed_text("red car").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stub_transcriber_skips_tiny_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.wav");
        std::fs::write(&path, b"x").unwrap();
        let transcriber = StubTranscriber;
        assert!(transcriber.transcribe_chunk(&path, "auto").unwrap().is_empty());
    }
}
