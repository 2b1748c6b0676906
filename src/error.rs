// Engine-wide error type.
//
// Every variant carries an `error_code` (via `code()`) that matches the taxonomy
// in the error handling design: stage runners, the HTTP layer, and the Job/Item
// rows all key off this code rather than matching on the Display string.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("library not found: {0}")]
    LibraryNotFound(i64),

    #[error("item not found: {0}")]
    ItemNotFound(i64),

    #[error("job not found: {0}")]
    JobNotFound(i64),

    #[error("person not found: {0}")]
    PersonNotFound(i64),

    #[error("face not found: {0}")]
    FaceNotFound(i64),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("ffmpeg error: {0}")]
    FfmpegError(String),

    #[error("transcription error: {0}")]
    TranscriptionError(String),

    #[error("embedding error: {0}")]
    EmbeddingError(String),

    #[error("detection error: {0}")]
    DetectionError(String),

    #[error("face error: {0}")]
    FaceError(String),

    #[error("stage cancelled")]
    Cancelled,

    #[error("database locked, requeue")]
    LockContention,

    #[error("required external dependency missing: {0}")]
    DependencyMissing(String),

    #[error("model missing: {0}")]
    ModelMissing(String),

    #[error("blocked by offline mode: {0}")]
    OfflineBlocked(String),

    #[error("invalid or missing bearer token")]
    AuthInvalid,

    #[error("origin rejected: {0}")]
    OriginRejected(String),

    #[error("engine already running at this data root")]
    AlreadyRunning,

    #[error("a conflicting engine instance holds this data root")]
    ConflictingEngine,

    #[error("engine startup timed out")]
    EngineStartupTimeout,

    #[error("{0}")]
    Other(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// The stable machine-readable code from spec §7, used in Job/Item rows
    /// and in the `{error_code, message}` body every HTTP handler returns.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::FileNotFound(_) => "FILE_NOT_FOUND",
            EngineError::FfmpegError(_) => "FFMPEG_ERROR",
            EngineError::TranscriptionError(_) => "TRANSCRIPTION_ERROR",
            EngineError::EmbeddingError(_) => "EMBEDDING_ERROR",
            EngineError::DetectionError(_) => "DETECTION_ERROR",
            EngineError::FaceError(_) => "FACE_ERROR",
            EngineError::Cancelled => "CANCELLED",
            EngineError::LockContention => "LOCK_CONTENTION",
            EngineError::DependencyMissing(_) => "DEPENDENCY_MISSING",
            EngineError::ModelMissing(_) => "MODEL_MISSING",
            EngineError::OfflineBlocked(_) => "OFFLINE_BLOCKED",
            EngineError::AuthInvalid => "AUTH_INVALID",
            EngineError::OriginRejected(_) => "ORIGIN_REJECTED",
            EngineError::AlreadyRunning => "ALREADY_RUNNING",
            EngineError::ConflictingEngine => "CONFLICTING_ENGINE",
            EngineError::EngineStartupTimeout => "ENGINE_STARTUP_TIMEOUT",
            EngineError::Database(e) => {
                if is_busy_or_locked(e) {
                    "LOCK_CONTENTION"
                } else {
                    "UNKNOWN_ERROR"
                }
            }
            _ => "UNKNOWN_ERROR",
        }
    }

    pub fn is_lock_contention(&self) -> bool {
        matches!(self, EngineError::LockContention)
            || matches!(self, EngineError::Database(e) if is_busy_or_locked(e))
    }
}

fn is_busy_or_locked(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
