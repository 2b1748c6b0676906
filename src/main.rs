// Engine process entry point: resolve configuration, claim the data root via
// the lockfile protocol, repair any inconsistency left by an unclean prior
// shutdown, then serve the API surface until asked to stop (spec §4.2).

use media_engine::api::{self, AppState};
use media_engine::config::Config;
use media_engine::lifecycle::{self, Lockfile, StartupOutcome};
use media_engine::pipeline::events::{EngineEvent, EventBus};
use media_engine::pipeline::ml::ModelBundle;
use media_engine::pipeline::PipelineManager;
use media_engine::store::open_db;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn parent_pid() -> u32 {
    std::env::var("ENGINE_PARENT_PID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(std::process::id)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    if let Err(e) = config.ensure_layout() {
        eprintln!("failed to create data root layout: {e}");
        std::process::exit(1);
    }

    let _guard = init_logging(&config);

    let parent_pid = parent_pid();
    let lockfile = match Lockfile::startup(&config.data_root, parent_pid) {
        Ok(StartupOutcome::Proceed(lockfile)) => lockfile,
        Ok(StartupOutcome::AlreadyRunning) => {
            tracing::warn!("an engine instance is already serving this data root");
            std::process::exit(10);
        }
        Ok(StartupOutcome::ConflictingEngine) => {
            tracing::error!("a conflicting engine instance holds this data root's lockfile");
            std::process::exit(11);
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to claim data root lockfile");
            std::process::exit(1);
        }
    };

    tracing::info!(
        port = lockfile.port,
        engine_uuid = %lockfile.engine_uuid,
        token = %lockfile.redacted_token(),
        "claimed data root"
    );

    let conn = match open_db(&config.data_root) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            let _ = Lockfile::remove(&config.data_root);
            std::process::exit(1);
        }
    };

    let events = EventBus::new();

    let repair = match lifecycle::run_consistency_repair(
        &conn,
        &config.thumbs_dir(),
        &config.shards_dir(),
        &config.faces_dir(),
    ) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "consistency repair failed");
            let _ = Lockfile::remove(&config.data_root);
            std::process::exit(1);
        }
    };
    events.publish(EngineEvent::ConsistencyRepair {
        items_requeued: repair.items_requeued,
        jobs_reclaimed: repair.jobs_reclaimed,
        orphaned_shards_removed: repair.orphaned_shards_removed,
        orphaned_thumbs_removed: repair.orphaned_thumbs_removed,
        temp_files_removed: repair.temp_files_removed,
    });

    let settings = match media_engine::config::Settings::load(&conn) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "failed to load settings");
            media_engine::config::Settings::default()
        }
    };
    drop(conn);

    let models = Arc::new(ModelBundle::stub());
    let pipeline = PipelineManager::new(config.clone(), models.clone(), events.clone(), settings.concurrent_job_limit);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let state = AppState {
        config: config.clone(),
        token: lockfile.token.clone(),
        engine_uuid: lockfile.engine_uuid.clone(),
        dev_origin: config.dev_origin.clone(),
        started_at: Instant::now(),
        pipeline: pipeline.clone(),
        models,
        events,
        shutdown_tx: shutdown_tx.clone(),
    };

    let sweep_handle = pipeline.clone().spawn_sweep_loop();
    let watchdog_handle = lifecycle::watchdog::spawn(parent_pid, shutdown_tx.clone());

    let router = api::build_router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], lockfile.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind HTTP listener");
            let _ = Lockfile::remove(&config.data_root);
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "serving");

    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await;

    if let Err(e) = serve_result {
        tracing::error!(error = %e, "server exited with error");
    }

    // Bounded grace window for in-flight stage work to reach its next
    // checkpoint (spec §5 "shutdown cancels all running jobs and awaits
    // their next checkpoint with a bounded grace window (≤3 s)").
    tokio::time::sleep(Duration::from_secs(media_engine::constants::SHUTDOWN_GRACE_SECS)).await;

    sweep_handle.abort();
    watchdog_handle.abort();
    let _ = Lockfile::remove(&config.data_root);
    tracing::info!("shutdown complete");
}

/// Structured logging to a rolling daily file under the data root's
/// `logs/` directory. The returned guard must be held for the process
/// lifetime or buffered writes are lost on exit.
fn init_logging(config: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(config.logs_dir(), "engine.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .init();

    guard
}
