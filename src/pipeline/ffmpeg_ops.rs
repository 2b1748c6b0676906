// ffmpeg-backed media extraction: canonical mono audio, sampled video frames,
// and photo thumbnails. Mirrors the teacher's thumbnail generator (atomic
// temp-file + rename, `-y` to overwrite, size/existence verification after
// the process exits) and extends it to the extra artifact kinds this stage
// needs.

use crate::constants::DEFAULT_THUMBNAIL_QUALITY;
use crate::error::{EngineError, Result};
use std::path::Path;
use std::process::Command;

/// Extract a canonical mono 16kHz WAV from `source_path` into `output_path`,
/// suitable as input to a chunked transcriber (spec §4.4 stage 1). Atomic:
/// writes to a temp path and renames into place only once ffmpeg exits
/// cleanly and the result is non-empty.
pub fn extract_audio(source_path: &Path, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = output_path.with_extension("tmp.wav");

    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args([
        "-y",
        "-i",
        source_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
        "-vn",
        "-ac",
        "1",
        "-ar",
        "16000",
        "-f",
        "wav",
        tmp_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
    ]);

    let output = cmd.output()?;
    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::FfmpegError(format!("audio extraction failed: {}", stderr)));
    }

    std::fs::rename(&tmp_path, output_path)?;
    verify_non_empty(output_path, "audio track")
}

/// Slice `length_secs` out of a canonical WAV starting at `start_secs`, for
/// feeding one chunk at a time to a chunked transcriber (spec §4.4 stage 2,
/// `chunking_enabled`/`chunk_length_seconds`).
pub fn extract_audio_chunk(source_wav: &Path, start_secs: f64, length_secs: f64, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = output_path.with_extension("tmp.wav");

    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args([
        "-y",
        "-ss",
        &format_duration(start_secs.max(0.0)),
        "-t",
        &format_duration(length_secs.max(0.0)),
        "-i",
        source_wav.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
        "-ac",
        "1",
        "-ar",
        "16000",
        "-f",
        "wav",
        tmp_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
    ]);

    let output = cmd.output()?;
    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::FfmpegError(format!("audio chunk extraction failed: {}", stderr)));
    }

    std::fs::rename(&tmp_path, output_path)?;
    verify_non_empty(output_path, "audio chunk")
}

/// Sample frames from a video at a fixed interval, writing one JPEG per
/// sample into `frames_dir` as `frame_%05d.jpg`. Returns the timestamp (ms)
/// assigned to each produced frame, in order.
pub fn sample_video_frames(
    source_path: &Path,
    frames_dir: &Path,
    interval_secs: f64,
    duration_ms: i64,
) -> Result<Vec<i64>> {
    std::fs::create_dir_all(frames_dir)?;
    let pattern = frames_dir.join("frame_%05d.jpg");
    let fps = if interval_secs > 0.0 { 1.0 / interval_secs } else { 1.0 };

    let q_value = quality_to_ffmpeg_scale(DEFAULT_THUMBNAIL_QUALITY);
    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args([
        "-y",
        "-i",
        source_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
        "-vf",
        &format!("fps={:.6},scale='min(1280,iw)':-1", fps),
        "-q:v",
        &q_value.to_string(),
        pattern.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
    ]);

    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::FfmpegError(format!("frame sampling failed: {}", stderr)));
    }

    let mut frame_count = 0usize;
    while frames_dir.join(format!("frame_{:05}.jpg", frame_count + 1)).exists() {
        frame_count += 1;
    }

    let step_ms = (interval_secs * 1000.0).round() as i64;
    let timestamps: Vec<i64> = (0..frame_count)
        .map(|i| {
            let ts = i as i64 * step_ms.max(1);
            ts.min(duration_ms.max(0))
        })
        .collect();

    if timestamps.is_empty() {
        return Err(EngineError::FfmpegError("no frames produced".into()));
    }
    Ok(timestamps)
}

/// Extract the single representative frame for a photo item: the photo
/// itself, transcoded to JPEG so downstream stages have a uniform input
/// format regardless of source container (HEIC, PNG, ...).
pub fn extract_photo_frame(source_path: &Path, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = output_path.with_extension("tmp.jpg");

    let q_value = quality_to_ffmpeg_scale(DEFAULT_THUMBNAIL_QUALITY);
    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args([
        "-y",
        "-i",
        source_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
        "-vf",
        "scale='min(1280,iw)':-1",
        "-q:v",
        &q_value.to_string(),
        tmp_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
    ]);

    let output = cmd.output()?;
    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::FfmpegError(format!("photo frame extraction failed: {}", stderr)));
    }

    std::fs::rename(&tmp_path, output_path)?;
    verify_non_empty(output_path, "photo frame")
}

/// Generate a display thumbnail (poster frame for video, resized copy for
/// photos) the same way the teacher's `preview::thumb` does: seek 10% into
/// the video to skip black leader frames, scale to a max width, map our
/// 0-100 quality setting onto ffmpeg's inverted 1-31 `-q:v` scale.
pub fn generate_thumbnail(source_path: &Path, output_path: &Path, duration_ms: Option<i64>) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = output_path.with_extension("tmp.jpg");

    let seek_seconds = duration_ms
        .map(|d| (d as f64 / 1000.0) * 0.1)
        .unwrap_or(1.0)
        .max(0.1);
    let seek_time = format_duration(seek_seconds);
    let q_value = quality_to_ffmpeg_scale(DEFAULT_THUMBNAIL_QUALITY);

    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args([
        "-y",
        "-ss",
        &seek_time,
        "-i",
        source_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
        "-vframes",
        "1",
        "-vf",
        "scale='min(480,iw)':-1",
        "-q:v",
        &q_value.to_string(),
        tmp_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
    ]);

    let output = cmd.output()?;
    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::FfmpegError(format!("thumbnail generation failed: {}", stderr)));
    }

    std::fs::rename(&tmp_path, output_path)?;
    verify_non_empty(output_path, "thumbnail")
}

/// Crop and write a single face region to `output_path` for review-queue
/// display, given the source frame and a normalized [0,1] bounding box.
pub fn crop_face(frame_path: &Path, output_path: &Path, bbox: [f64; 4]) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = output_path.with_extension("tmp.jpg");

    let [x, y, w, h] = bbox;
    let crop_filter = format!(
        "crop=iw*{:.6}:ih*{:.6}:iw*{:.6}:ih*{:.6}",
        w.clamp(0.01, 1.0),
        h.clamp(0.01, 1.0),
        x.clamp(0.0, 1.0),
        y.clamp(0.0, 1.0)
    );

    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args([
        "-y",
        "-i",
        frame_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
        "-vf",
        &crop_filter,
        tmp_path.to_str().ok_or_else(|| EngineError::InvalidPath("non-utf8 path".into()))?,
    ]);

    let output = cmd.output()?;
    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::FfmpegError(format!("face crop failed: {}", stderr)));
    }

    std::fs::rename(&tmp_path, output_path)?;
    verify_non_empty(output_path, "face crop")
}

fn verify_non_empty(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(EngineError::FfmpegError(format!("{} was not created", what)));
    }
    let size = std::fs::metadata(path)?.len();
    if size == 0 {
        let _ = std::fs::remove_file(path);
        return Err(EngineError::FfmpegError(format!("{} is empty", what)));
    }
    Ok(())
}

fn quality_to_ffmpeg_scale(quality: u32) -> u32 {
    ((100 - quality.min(100)) as f32 / 100.0 * 30.0 + 1.0) as u32
}

fn format_duration(seconds: f64) -> String {
    let hours = (seconds / 3600.0) as u32;
    let minutes = ((seconds % 3600.0) / 60.0) as u32;
    let secs = seconds % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_matches_ffmpeg_timecode_shape() {
        assert_eq!(format_duration(0.0), "00:00:00.000");
        assert_eq!(format_duration(65.25), "00:01:05.250");
        assert_eq!(format_duration(3661.0), "01:01:01.000");
    }

    #[test]
    fn quality_scale_is_inverted_and_bounded() {
        assert_eq!(quality_to_ffmpeg_scale(100), 1);
        assert_eq!(quality_to_ffmpeg_scale(0), 31);
        assert_eq!(quality_to_ffmpeg_scale(150), 1);
    }
}
