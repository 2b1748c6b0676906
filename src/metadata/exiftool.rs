// exiftool wrapper: EXIF date, camera, and GPS extraction.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExifMetadata {
    pub recorded_at: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub serial_number: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ExifToolOutput {
    #[serde(rename = "DateTimeOriginal")]
    date_time_original: Option<String>,
    #[serde(rename = "CreateDate")]
    create_date: Option<String>,
    #[serde(rename = "MediaCreateDate")]
    media_create_date: Option<String>,
    #[serde(rename = "Make")]
    make: Option<String>,
    #[serde(rename = "Model")]
    model: Option<String>,
    #[serde(rename = "SerialNumber")]
    serial_number: Option<String>,
    #[serde(rename = "InternalSerialNumber")]
    internal_serial_number: Option<String>,
    #[serde(rename = "GPSLatitude")]
    gps_latitude: Option<String>,
    #[serde(rename = "GPSLongitude")]
    gps_longitude: Option<String>,
}

/// Run exiftool on a file and extract EXIF date/camera/GPS metadata.
pub fn extract(path: &Path) -> Result<ExifMetadata> {
    let output = Command::new(crate::tools::exiftool_path())
        .args([
            "-j",
            "-DateTimeOriginal",
            "-CreateDate",
            "-MediaCreateDate",
            "-Make",
            "-Model",
            "-SerialNumber",
            "-InternalSerialNumber",
            "-GPSLatitude",
            "-GPSLongitude",
        ])
        .arg(path)
        .output()
        .map_err(|e| EngineError::Other(format!("failed to run exiftool: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Other(format!("exiftool failed: {}", stderr)));
    }

    let exif_output: Vec<ExifToolOutput> = serde_json::from_slice(&output.stdout)
        .map_err(|e| EngineError::Other(format!("failed to parse exiftool output: {}", e)))?;

    let exif = exif_output.into_iter().next().unwrap_or_default();

    let mut meta = ExifMetadata::default();

    let raw_date = exif
        .date_time_original
        .or(exif.create_date)
        .or(exif.media_create_date);

    meta.recorded_at = raw_date.and_then(|d| parse_exif_date(&d));
    meta.camera_make = exif.make;
    meta.camera_model = exif.model;
    meta.serial_number = exif.serial_number.or(exif.internal_serial_number);

    if let Some(lat_str) = exif.gps_latitude {
        meta.gps_latitude = parse_gps_coord(&lat_str);
    }
    if let Some(lon_str) = exif.gps_longitude {
        meta.gps_longitude = parse_gps_coord(&lon_str);
    }

    Ok(meta)
}

/// Parse an EXIF date ("YYYY:MM:DD HH:MM:SS") into ISO 8601 UTC.
fn parse_exif_date(date_str: &str) -> Option<String> {
    let parts: Vec<&str> = date_str.splitn(2, ' ').collect();
    if parts.len() != 2 {
        return None;
    }
    let date_part = parts[0].replace(':', "-");
    let time_part = parts[1];

    let combined = format!("{}T{}", date_part, time_part);
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&combined, "%Y-%m-%dT%H:%M:%S") {
        return Some(format!("{}Z", dt.format("%Y-%m-%dT%H:%M:%S")));
    }

    Some(format!("{}Z", combined))
}

/// Parse a GPS coordinate string to decimal degrees. Handles both the plain
/// decimal form and exiftool's "34 deg 3' 30.00\" N" DMS form.
fn parse_gps_coord(coord_str: &str) -> Option<f64> {
    if let Ok(val) = coord_str.parse::<f64>() {
        return Some(val);
    }

    let re = regex::Regex::new(r#"(\d+)\s*(?:deg|°)\s*(\d+)'\s*([\d.]+)"?\s*([NSEW])?"#).ok()?;
    let caps = re.captures(coord_str)?;

    let deg: f64 = caps.get(1)?.as_str().parse().ok()?;
    let min: f64 = caps.get(2)?.as_str().parse().ok()?;
    let sec: f64 = caps.get(3)?.as_str().parse().ok()?;
    let dir = caps.get(4).map(|m| m.as_str()).unwrap_or("N");

    let mut decimal = deg + min / 60.0 + sec / 3600.0;
    if dir == "S" || dir == "W" {
        decimal = -decimal;
    }

    Some(decimal)
}

/// Check if exiftool is available on this system.
pub fn is_available() -> bool {
    crate::tools::is_tool_available("exiftool")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exif_date_to_iso() {
        assert_eq!(
            parse_exif_date("2019:07:04 12:30:45").as_deref(),
            Some("2019-07-04T12:30:45Z")
        );
    }

    #[test]
    fn parses_decimal_gps_coord() {
        assert_eq!(parse_gps_coord("34.0583"), Some(34.0583));
    }

    #[test]
    fn parses_dms_gps_coord_with_south_direction() {
        let val = parse_gps_coord(r#"34 deg 3' 30.00" S"#).unwrap();
        assert!(val < 0.0);
    }

    #[test]
    fn rejects_garbage_gps_coord() {
        assert_eq!(parse_gps_coord("not a coordinate"), None);
    }
}
