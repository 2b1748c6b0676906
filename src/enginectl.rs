// Maintenance CLI: operates on a data root directly, without going through
// the HTTP API. Mirrors the teacher's dual-binary layout (a CLI front end
// alongside the long-running engine) for scripting and debugging.

use clap::{Parser, Subcommand};
use media_engine::config::Config;
use media_engine::error::Result;
use media_engine::lifecycle;
use media_engine::scanner;
use media_engine::search::{self, SearchQuery};
use media_engine::store::{open_db, schema};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "enginectl")]
#[command(about = "Operate on a media-engine data root directly", long_about = None)]
#[command(version)]
struct Cli {
    /// Data root to operate on (defaults to ENGINE_DATA_DIR / the OS data dir)
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a registered library for new/changed/deleted files
    Scan {
        /// Library id
        library_id: i64,
    },

    /// Report item and job counts by status
    Status,

    /// List jobs, optionally filtered by status
    Jobs {
        #[arg(long)]
        status: Option<String>,
    },

    /// Run a search query against the store
    Search {
        /// Free-text query
        query: String,
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Run startup consistency repair against the data root
    Repair,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(data_root) = cli.data_root {
        config.data_root = data_root;
    }
    config.ensure_layout()?;

    match cli.command {
        Commands::Scan { library_id } => cmd_scan(&config, library_id),
        Commands::Status => cmd_status(&config),
        Commands::Jobs { status } => cmd_jobs(&config, status),
        Commands::Search { query, limit } => cmd_search(&config, &query, limit),
        Commands::Repair => cmd_repair(&config),
    }
    .map_err(|e| anyhow::anyhow!("{e}"))
}

fn cmd_scan(config: &Config, library_id: i64) -> Result<()> {
    let conn = open_db(&config.data_root)?;
    let library = schema::get_library(&conn, library_id)?
        .ok_or(media_engine::error::EngineError::LibraryNotFound(library_id))?;
    let report = scanner::scan_library(&conn, &library)?;

    println!("scanned '{}' ({})", library.name, library.path);
    println!("  found:   {}", report.files_found);
    println!("  new:     {}", report.files_new);
    println!("  changed: {}", report.files_changed);
    println!("  renamed: {}", report.files_renamed);
    println!("  deleted: {}", report.files_deleted);
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let conn = open_db(&config.data_root)?;
    let libraries = schema::list_libraries(&conn)?;
    println!("data root: {}", config.data_root.display());
    println!("libraries: {}", libraries.len());

    for status in ["QUEUED", "EXTRACTING_FRAMES", "TRANSCRIBING", "DETECTING_OBJECTS", "DETECTING_FACES", "DONE", "FAILED"] {
        let count = schema::list_items_by_status(&conn, &[status])?.len();
        if count > 0 {
            println!("  {:<20} {}", status, count);
        }
    }
    Ok(())
}

fn cmd_jobs(config: &Config, status: Option<String>) -> Result<()> {
    let conn = open_db(&config.data_root)?;
    for job in schema::list_jobs(&conn, status.as_deref())? {
        println!(
            "#{:<6} item={:<6} {:<10} {:<22} {:>5.1}%  {}",
            job.id,
            job.item_id,
            job.status,
            job.current_stage.as_deref().unwrap_or("-"),
            job.progress * 100.0,
            job.message.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn cmd_search(config: &Config, query: &str, limit: i64) -> Result<()> {
    let conn = open_db(&config.data_root)?;
    let models = media_engine::pipeline::ml::ModelBundle::stub();
    let results = search::search(
        &conn,
        config,
        &models,
        &SearchQuery { text: query.to_string(), mode: search::SearchMode::Both, limit, library_id: None, person_id: None },
    )?;

    for result in &results {
        println!(
            "item={:<6} t={:>8}ms score={:.3} sources={:?}",
            result.item_id, result.timestamp_ms, result.score, result.match_sources
        );
        if let Some(snippet) = &result.snippet {
            println!("    {}", snippet);
        }
    }
    println!("{} result(s)", results.len());
    Ok(())
}

fn cmd_repair(config: &Config) -> Result<()> {
    let conn = open_db(&config.data_root)?;
    let report = lifecycle::run_consistency_repair(&conn, &config.thumbs_dir(), &config.shards_dir(), &config.faces_dir())?;
    println!("items requeued:          {}", report.items_requeued);
    println!("jobs reclaimed:          {}", report.jobs_reclaimed);
    println!("orphaned shards removed: {}", report.orphaned_shards_removed);
    println!("orphaned thumbs removed: {}", report.orphaned_thumbs_removed);
    println!("temp files removed:      {}", report.temp_files_removed);
    Ok(())
}
