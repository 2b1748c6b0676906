// Engine constants.
// These values come from the system contracts. Do not change without updating DESIGN.md.

// ----- Data root layout -----
pub const DATA_ROOT_ENV: &str = "ENGINE_DATA_DIR";
pub const DB_FILENAME: &str = "engine.db";
pub const THUMBS_FOLDER: &str = "thumbnails";
pub const FACES_FOLDER: &str = "faces";
pub const SHARDS_FOLDER: &str = "shards";
pub const AUDIO_FOLDER: &str = "audio";
pub const MODELS_FOLDER: &str = "models";
pub const LOGS_FOLDER: &str = "logs";

// ----- Fingerprinting -----
pub const FINGERPRINT_ALGORITHM: &str = "blake3";
pub const FINGERPRINT_SCHEME: &str = "head_tail_size_v1";
pub const FINGERPRINT_CHUNK_SIZE: usize = 64 * 1024; // 64 KiB head + tail

// ----- Lifecycle -----
pub const LOCKFILE_NAME: &str = "engine.lock";
pub const PORT_RANGE_START: u16 = 48100;
pub const PORT_RANGE_END: u16 = 48199;
pub const TOKEN_BYTES: usize = 32;
pub const WATCHDOG_INTERVAL_SECS: u64 = 10;
pub const WATCHDOG_MISSES_BEFORE_SHUTDOWN: u32 = 3;
pub const SHUTDOWN_GRACE_SECS: u64 = 3;
pub const HEALTH_PROBE_TIMEOUT_MS: u64 = 1500;

// ----- API transport -----
// Origin of the desktop shell webview that is always allowed, regardless of
// `ENGINE_DEV_ORIGIN`. The shell embeds a Tauri webview, whose requests carry
// this fixed origin.
pub const SHELL_ORIGIN: &str = "tauri://localhost";
pub const EVENT_STREAM_QUERY_TOKEN_KEY: &str = "token";

// ----- Store / retry -----
pub const DB_BUSY_TIMEOUT_MS: u32 = 30_000;
pub const RETRY_BASE_BACKOFF_MS: u64 = 50;
pub const RETRY_MAX_BACKOFF_MS: u64 = 1_000;
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

// ----- Pipeline / concurrency -----
pub const DEFAULT_CONCURRENT_JOB_LIMIT: usize = 10;
pub const AUTO_CONTINUATION_SWEEP_SECS: u64 = 5;
pub const DEFAULT_FRAME_SAMPLE_INTERVAL_SECS: f64 = 2.0;
pub const FRAME_RETENTION_COUNT: usize = 15;
pub const DEFAULT_CHUNK_LENGTH_SECS: f64 = 30.0;
pub const MIN_SEGMENT_DURATION_SECS: f64 = 0.5;
pub const MIN_SEGMENT_BYTES: usize = 1024;
pub const DEFAULT_THUMBNAIL_QUALITY: u32 = 85;
pub const LIVE_PHOTO_MAX_VIDEO_SECS: f64 = 5.0;

// ----- Searcher -----
pub const VISUAL_SIMILARITY_THRESHOLD: f32 = 0.18;
pub const VISUAL_TOP_K_PER_ITEM: usize = 20;
pub const TRANSCRIPT_MOMENT_WINDOW_MS: i64 = 2_000;
pub const VISUAL_MOMENT_WINDOW_MS: i64 = 3_000;
pub const DETECTOR_BOOST_WINDOW_MS: i64 = 1_000;
pub const DETECTOR_BOOST_PER_LABEL: f32 = 0.05;
pub const DETECTOR_BOOST_MAX: f32 = 0.15;
pub const COLOR_BOOST: f32 = 0.05;
pub const TRANSCRIPT_FUSION_WEIGHT: f32 = 0.5;
pub const VISUAL_FUSION_WEIGHT: f32 = 0.5;
pub const DEFAULT_PERSON_FILTER_WINDOW_MS: i64 = 3_000;
pub const DEFAULT_SEARCH_PAGE_SIZE: i64 = 50;

// ----- Face learner -----
pub const PAIR_THRESHOLD_MIN: f32 = 0.70;
pub const PAIR_THRESHOLD_MAX: f32 = 0.85;
pub const PAIR_THRESHOLD_STEP: f32 = 0.02;
pub const FACE_AUTO_ACCEPT_FLOOR: f32 = 0.65;
pub const FACE_NEGATIVE_TOLERANCE_DEFAULT: f32 = 0.70;
pub const FACE_CLUSTER_THRESHOLD: f32 = 0.6;
pub const FACE_REVIEW_QUEUE_THRESHOLD: f32 = 0.70;
pub const CENTROID_WEIGHT_REFERENCE: f32 = 3.0;
pub const CENTROID_WEIGHT_MANUAL: f32 = 2.0;
pub const CENTROID_WEIGHT_AUTO: f32 = 1.0;

// ----- Model download retry (network ledger) -----
pub const MODEL_DOWNLOAD_BACKOFF_SECS: [u64; 3] = [2, 4, 8];

// ----- Object label / color vocabulary -----
pub const COLOR_CATEGORIES: [&str; 11] = [
    "red", "orange", "yellow", "green", "blue", "purple", "pink", "brown", "black", "white", "gray",
];

// ----- Extensions -----
pub const VIDEO_EXTENSIONS: [&str; 13] = [
    "mp4", "mov", "avi", "mkv", "mts", "m2ts", "mpg", "mpeg", "wmv", "webm", "3gp", "m4v", "ts",
];

pub const PHOTO_EXTENSIONS: [&str; 7] = [
    "jpg", "jpeg", "png", "heic", "heif", "bmp", "tiff",
];

// ----- Pipeline stage ordering -----
pub const PRIMARY_STAGE_COUNT: usize = 4; // EXTRACTING_FRAMES, EMBEDDING, DETECTING, DETECTING_FACES
pub const ENHANCED_STAGE_COUNT: usize = 2; // EXTRACTING_AUDIO, TRANSCRIBING
