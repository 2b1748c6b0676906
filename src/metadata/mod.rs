// Container + EXIF metadata extraction, merged into one record per item.

pub mod exiftool;
pub mod ffprobe;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Combined metadata from ffprobe (container/stream) and exiftool (EXIF/GPS).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    // Video properties
    pub duration_ms: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub bitrate: Option<i64>,

    // Audio properties
    pub audio_codec: Option<String>,
    pub audio_channels: Option<i32>,
    pub audio_sample_rate: Option<i32>,

    // Date/time
    pub recorded_at: Option<String>,
    pub recorded_at_source: Option<String>,

    // Camera info
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,

    // Location
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,

    /// `video` or `photo`, per the two media kinds this engine indexes.
    pub media_type: String,
}

/// Extract metadata from a media file, preferring exiftool for dates/GPS/camera
/// info (more reliable for camera-recorded files) and ffprobe for container/stream
/// properties.
pub fn extract_metadata(path: &Path) -> Result<MediaMetadata> {
    let mut meta = ffprobe::probe(path)?;

    if let Ok(exif) = exiftool::extract(path) {
        if meta.recorded_at.is_none() && exif.recorded_at.is_some() {
            meta.recorded_at = exif.recorded_at;
            meta.recorded_at_source = Some("exiftool".to_string());
        }
        if meta.camera_make.is_none() {
            meta.camera_make = exif.camera_make;
        }
        if meta.camera_model.is_none() {
            meta.camera_model = exif.camera_model;
        }
        if meta.gps_latitude.is_none() {
            meta.gps_latitude = exif.gps_latitude;
        }
        if meta.gps_longitude.is_none() {
            meta.gps_longitude = exif.gps_longitude;
        }
    }

    Ok(meta)
}

/// Determine media type (`video` or `photo`) from file extension.
pub fn detect_media_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if crate::constants::PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        "photo".to_string()
    } else {
        // VIDEO_EXTENSIONS or unrecognized: the scanner only enumerates
        // known extensions, so anything reaching here that isn't a photo
        // extension was discovered as a video.
        "video".to_string()
    }
}

/// Try to parse a timestamp from a folder name (e.g. "2019-07-04" or "20190704"),
/// used as a fallback source when container/EXIF metadata has no date.
pub fn parse_folder_date(folder_name: &str) -> Option<String> {
    if let Ok(date) = chrono::NaiveDate::parse_from_str(folder_name, "%Y-%m-%d") {
        return Some(format!("{}T00:00:00Z", date));
    }

    if let Ok(date) = chrono::NaiveDate::parse_from_str(folder_name, "%Y%m%d") {
        return Some(format!("{}T00:00:00Z", date));
    }

    // Extract an embedded date from names like "2019-07-04 Birthday"
    let date_regex = regex::Regex::new(r"(\d{4})-(\d{2})-(\d{2})").ok()?;
    if let Some(caps) = date_regex.captures(folder_name) {
        let year = caps.get(1)?.as_str();
        let month = caps.get(2)?.as_str();
        let day = caps.get(3)?.as_str();
        return Some(format!("{}-{}-{}T00:00:00Z", year, month, day));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detects_photo_extension() {
        assert_eq!(detect_media_type(&PathBuf::from("a.JPG")), "photo");
        assert_eq!(detect_media_type(&PathBuf::from("a.heic")), "photo");
    }

    #[test]
    fn detects_video_extension() {
        assert_eq!(detect_media_type(&PathBuf::from("a.mp4")), "video");
        assert_eq!(detect_media_type(&PathBuf::from("a.MOV")), "video");
    }

    #[test]
    fn parses_iso_folder_date() {
        assert_eq!(
            parse_folder_date("2019-07-04").as_deref(),
            Some("2019-07-04T00:00:00Z")
        );
    }

    #[test]
    fn parses_compact_folder_date() {
        assert_eq!(
            parse_folder_date("20190704").as_deref(),
            Some("2019-07-04T00:00:00Z")
        );
    }

    #[test]
    fn parses_embedded_folder_date() {
        assert_eq!(
            parse_folder_date("2019-07-04 Birthday Party").as_deref(),
            Some("2019-07-04T00:00:00Z")
        );
    }

    #[test]
    fn rejects_unparseable_folder_name() {
        assert_eq!(parse_folder_date("Vacation Clips"), None);
    }
}
