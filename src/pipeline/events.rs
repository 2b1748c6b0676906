// Event types published over the event-stream transport (spec §6). A single
// `tokio::sync::broadcast` channel carries every topic; subscribers filter
// client-side the way the teacher's job-progress emitter fans a single event
// name out to whichever webview windows are listening.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ScanProgress {
        library_id: i64,
        files_found: usize,
        files_new: usize,
        files_changed: usize,
        files_deleted: usize,
    },
    JobProgress {
        job_id: i64,
        item_id: i64,
        stage: String,
        progress: f64,
        message: Option<String>,
    },
    JobComplete {
        job_id: i64,
        item_id: i64,
    },
    JobFailed {
        job_id: i64,
        item_id: i64,
        error_code: String,
        error_message: String,
    },
    ModelDownloadProgress {
        model: String,
        bytes_downloaded: u64,
        total_bytes: u64,
    },
    ModelDownloadComplete {
        model: String,
    },
    ModelDownloadError {
        model: String,
        error_message: String,
    },
    ConsistencyRepair {
        items_requeued: usize,
        jobs_reclaimed: usize,
        orphaned_shards_removed: usize,
        orphaned_thumbs_removed: usize,
        temp_files_removed: usize,
    },
    Error {
        error_code: String,
        message: String,
    },
}

/// Shared broadcast bus. A slow/absent subscriber never blocks publishers:
/// `tokio::sync::broadcast` drops the oldest buffered message instead, and
/// publishers ignore the `SendError` that means "nobody is listening".
#[derive(Clone)]
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(1024);
        EventBus { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
