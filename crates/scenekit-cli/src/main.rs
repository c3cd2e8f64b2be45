//! Scenekit - command-line entry point
//!
//! Imports model files and URLs into a fresh scene and reports what landed
//! where.

mod config;
mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scenekit_core::{HistoryRecorder, HistoryStore, LogLevel};
use scenekit_import::{FileImportService, ImportFile};
use scenekit_scene::{Scene3DService, SceneRoot};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::report::{ImportFailure, ImportSummary};

#[derive(Parser, Debug)]
#[command(name = "scenekit")]
#[command(about = "Import 3D models (glTF, GLB, OBJ, FBX, ZIP) into a scene")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "scenekit.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import files and URLs into a fresh scene
    Import {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Model URL to fetch over HTTP (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// Model or ZIP files
        paths: Vec<PathBuf>,
    },
    /// Write a default configuration file
    InitConfig {
        /// Destination, defaults to the --config path
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Scenekit v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::InitConfig { path } => {
            let path = path.unwrap_or(args.config);
            config::save_default_config(&path)?;
            info!(path = %path.display(), "Wrote default configuration");
            Ok(())
        }
        Command::Import { json, urls, paths } => {
            if paths.is_empty() && urls.is_empty() {
                anyhow::bail!("Nothing to import: pass file paths or --url");
            }
            let config = config::load_config(&args.config)?;
            let summary = run_import(config, &paths, &urls).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.render_table());
            }
            if !summary.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn run_import(config: Config, paths: &[PathBuf], urls: &[String]) -> Result<ImportSummary> {
    let service = FileImportService::new(config.import).context("Failed to start import service")?;
    let mut store = HistoryStore::new(&config.history);
    let mut recorder = HistoryRecorder::new(&mut store);
    let mut scene = Scene3DService::new();
    scene.initialize(SceneRoot::new("scene"));
    let mut summary = ImportSummary::default();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = ImportFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }

    if !files.is_empty() {
        info!(count = files.len(), "Importing files");
        // Successes are registered even when the batch policy skips failures
        let outcome = service.process_batch(&files).await;
        report::register_results(&mut scene, &mut recorder, outcome.results, &mut summary);
        for e in outcome.failures {
            error!(code = %e.code, error = %e, "File import failed");
            recorder.log(LogLevel::Error, format!("Import failed: {e}"));
            summary.failures.push(ImportFailure::from_error("files", &e));
        }
    }

    for url in urls {
        match service.import_from_url(url).await {
            Ok(result) => report::register_results(&mut scene, &mut recorder, vec![result], &mut summary),
            Err(e) => {
                error!(url = %url, code = %e.code, error = %e, "URL import failed");
                recorder.log(LogLevel::Error, format!("Import of {url} failed: {e}"));
                summary.failures.push(ImportFailure::from_error(url.as_str(), &e));
            }
        }
    }

    let state = scene.get_state();
    info!(
        objects = state.object_count,
        failures = summary.failures.len(),
        "Import finished"
    );
    Ok(summary)
}
