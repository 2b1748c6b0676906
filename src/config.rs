// Process-level configuration, resolved once at startup from the
// environment. Store-level `Settings` (transcription backend, VAD, etc.)
// live in the database; see `store::schema::{get_setting, set_setting}`.

use crate::constants::DATA_ROOT_ENV;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    pub dev_origin: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Resolve the data root: `<ENGINE>_DATA_DIR` env var, else the OS data
    /// directory via `directories`, else the current directory.
    pub fn from_env() -> Self {
        let data_root = std::env::var(DATA_ROOT_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                directories::ProjectDirs::from("", "", "media-engine")
                    .map(|dirs| dirs.data_dir().to_path_buf())
            })
            .unwrap_or_else(|| PathBuf::from("."));

        let dev_origin = std::env::var("ENGINE_DEV_ORIGIN").ok();
        let log_level = std::env::var("ENGINE_LOG").unwrap_or_else(|_| "info".to_string());

        Config {
            data_root,
            dev_origin,
            log_level,
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_root.join(crate::constants::LOGS_FOLDER)
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.data_root.join(crate::constants::THUMBS_FOLDER)
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.data_root.join(crate::constants::FACES_FOLDER)
    }

    pub fn shards_dir(&self) -> PathBuf {
        self.data_root.join(crate::constants::SHARDS_FOLDER)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_root.join(crate::constants::AUDIO_FOLDER)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_root.join(crate::constants::MODELS_FOLDER)
    }

    /// Create the data root layout if missing. Idempotent.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_root)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.thumbs_dir())?;
        std::fs::create_dir_all(self.faces_dir())?;
        std::fs::create_dir_all(self.shards_dir())?;
        std::fs::create_dir_all(self.audio_dir())?;
        std::fs::create_dir_all(self.models_dir())?;
        Ok(())
    }
}

/// Store-level settings, read through a typed accessor so a fresh store
/// behaves like one with every key explicitly set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Settings {
    pub transcription_model: String,
    pub transcription_language: String,
    pub transcription_backend: String,
    pub vad_enabled: bool,
    pub chunking_enabled: bool,
    pub chunk_length_seconds: f64,
    pub frame_sample_interval_seconds: f64,
    pub thumbnail_quality: u32,
    pub face_recognition_enabled: bool,
    pub offline_mode: bool,
    pub indexing_preset: String,
    pub prioritize_recent: bool,
    pub concurrent_job_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            transcription_model: "base".to_string(),
            transcription_language: "auto".to_string(),
            transcription_backend: "auto".to_string(),
            vad_enabled: true,
            chunking_enabled: true,
            chunk_length_seconds: crate::constants::DEFAULT_CHUNK_LENGTH_SECS,
            frame_sample_interval_seconds: crate::constants::DEFAULT_FRAME_SAMPLE_INTERVAL_SECS,
            thumbnail_quality: crate::constants::DEFAULT_THUMBNAIL_QUALITY,
            face_recognition_enabled: true,
            offline_mode: false,
            indexing_preset: "quick".to_string(),
            prioritize_recent: true,
            concurrent_job_limit: crate::constants::DEFAULT_CONCURRENT_JOB_LIMIT,
        }
    }
}

impl Settings {
    /// Load settings from the KV table, falling back to defaults for any
    /// key that has never been written.
    pub fn load(conn: &rusqlite::Connection) -> crate::error::Result<Self> {
        let mut settings = Settings::default();
        for (key, value) in crate::store::schema::list_settings(conn)? {
            apply_setting(&mut settings, &key, &value);
        }
        Ok(settings)
    }

    pub fn save(&self, conn: &rusqlite::Connection) -> crate::error::Result<()> {
        use crate::store::schema::set_setting;
        set_setting(conn, "transcription_model", &self.transcription_model)?;
        set_setting(conn, "transcription_language", &self.transcription_language)?;
        set_setting(conn, "transcription_backend", &self.transcription_backend)?;
        set_setting(conn, "vad_enabled", &self.vad_enabled.to_string())?;
        set_setting(conn, "chunking_enabled", &self.chunking_enabled.to_string())?;
        set_setting(conn, "chunk_length_seconds", &self.chunk_length_seconds.to_string())?;
        set_setting(
            conn,
            "frame_sample_interval_seconds",
            &self.frame_sample_interval_seconds.to_string(),
        )?;
        set_setting(conn, "thumbnail_quality", &self.thumbnail_quality.to_string())?;
        set_setting(
            conn,
            "face_recognition_enabled",
            &self.face_recognition_enabled.to_string(),
        )?;
        set_setting(conn, "offline_mode", &self.offline_mode.to_string())?;
        set_setting(conn, "indexing_preset", &self.indexing_preset)?;
        set_setting(conn, "prioritize_recent", &self.prioritize_recent.to_string())?;
        set_setting(conn, "concurrent_job_limit", &self.concurrent_job_limit.to_string())?;
        Ok(())
    }
}

fn apply_setting(settings: &mut Settings, key: &str, value: &str) {
    match key {
        "transcription_model" => settings.transcription_model = value.to_string(),
        "transcription_language" => settings.transcription_language = value.to_string(),
        "transcription_backend" => settings.transcription_backend = value.to_string(),
        "vad_enabled" => settings.vad_enabled = value.parse().unwrap_or(settings.vad_enabled),
        "chunking_enabled" => settings.chunking_enabled = value.parse().unwrap_or(settings.chunking_enabled),
        "chunk_length_seconds" => {
            settings.chunk_length_seconds = value.parse().unwrap_or(settings.chunk_length_seconds)
        }
        "frame_sample_interval_seconds" => {
            settings.frame_sample_interval_seconds =
                value.parse().unwrap_or(settings.frame_sample_interval_seconds)
        }
        "thumbnail_quality" => settings.thumbnail_quality = value.parse().unwrap_or(settings.thumbnail_quality),
        "face_recognition_enabled" => {
            settings.face_recognition_enabled = value.parse().unwrap_or(settings.face_recognition_enabled)
        }
        "offline_mode" => settings.offline_mode = value.parse().unwrap_or(settings.offline_mode),
        "indexing_preset" => settings.indexing_preset = value.to_string(),
        "prioritize_recent" => settings.prioritize_recent = value.parse().unwrap_or(settings.prioritize_recent),
        "concurrent_job_limit" => {
            settings.concurrent_job_limit = value.parse().unwrap_or(settings.concurrent_job_limit)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    #[test]
    fn fresh_store_yields_default_settings() {
        let conn = open_memory().unwrap();
        let settings = Settings::load(&conn).unwrap();
        assert_eq!(settings.concurrent_job_limit, crate::constants::DEFAULT_CONCURRENT_JOB_LIMIT);
        assert!(!settings.offline_mode);
    }

    #[test]
    fn saved_settings_round_trip() {
        let conn = open_memory().unwrap();
        let mut settings = Settings::default();
        settings.offline_mode = true;
        settings.concurrent_job_limit = 3;
        settings.save(&conn).unwrap();

        let loaded = Settings::load(&conn).unwrap();
        assert!(loaded.offline_mode);
        assert_eq!(loaded.concurrent_job_limit, 3);
    }
}
