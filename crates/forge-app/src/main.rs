//! InsightForge application binary - composition root.
//!
//! Ties the InsightForge crates into a single executable:
//! 1. Load configuration from TOML, env vars and CLI flags
//! 2. Open the vector store database and choose the embedding backend
//! 3. Build the dashboard session and reload the latest upload
//! 4. Serve the axum JSON API on localhost
//!
//! The `profile`, `context`, `samples` and `ask` subcommands run one-shot
//! against a local file instead of starting the server.

mod cli;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use forge_analysis::{AnalysisEngine, AnalysisError};
use forge_api::{start_server, AppState, Session};
use forge_core::error::ForgeError;
use forge_core::ForgeConfig;
use forge_loader::{load_path, sample, to_context, LoadedContent};
use forge_retrieval::{embedding_service_from_config, format_context, RetrievalEngine};
use forge_storage::Database;
use forge_viz::compute_kpi_cards;
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, Command};

type AppResult = Result<(), Box<dyn Error>>;

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
fn init_tracing(cli_level: Option<&str>, config_level: &str) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> AppResult {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match ForgeConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (ForgeConfig::default(), Some(e)),
    };
    config.apply_env_overrides();
    args.apply_overrides(&mut config);

    init_tracing(args.log_level.as_deref(), &config.general.log_level);
    tracing::info!("Starting InsightForge v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Configuration not loaded, using defaults"
        ),
    }

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    match args.command() {
        Command::Serve => serve(config).await,
        Command::Profile { file } => print_profile(&file),
        Command::Context { file, rows } => {
            print_context(&file, rows.unwrap_or(config.analysis.max_context_rows))
        }
        Command::Samples { out } => write_samples(&out.unwrap_or_else(|| config.samples_dir())),
        Command::Ask { file, question } => ask(config, &file, &question).await,
    }
}

async fn serve(config: ForgeConfig) -> AppResult {
    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db = Arc::new(Database::new(&config.database_path())?);

    let embedder = embedding_service_from_config(&config.embedding);
    tracing::info!(
        provider = embedder.provider_name(),
        dimensions = embedder.dimensions(),
        "Embedding service ready"
    );

    let mut session = Session::new(config.clone(), embedder, Some(db))?;
    session.auto_load_latest().await;

    let state = AppState::new(session);
    tracing::info!("Dashboard API at http://127.0.0.1:{}", config.general.port);

    if let Err(e) = start_server(&config, state).await {
        tracing::error!(error = %e, "Server stopped - is another instance running?");
        return Err(e.into());
    }
    Ok(())
}

fn print_profile(file: &Path) -> AppResult {
    let LoadedContent::Tabular(dataset) = load_path(file)? else {
        return Err(ForgeError::Ingest(format!("{} is not a tabular file", file.display())).into());
    };
    let report = serde_json::json!({
        "profile": forge_loader::profile(&dataset),
        "kpis": compute_kpi_cards(&dataset),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_context(file: &Path, rows: usize) -> AppResult {
    match load_path(file)? {
        LoadedContent::Tabular(dataset) => println!("{}", to_context(&dataset, rows)),
        LoadedContent::Document(text) => println!("{}", text),
        LoadedContent::Image(_) => {
            return Err(ForgeError::Ingest(format!("{} is an image", file.display())).into())
        }
    }
    Ok(())
}

fn write_samples(dir: &Path) -> AppResult {
    for path in sample::save_samples(dir)? {
        println!("{}", path.display());
    }
    Ok(())
}

/// One-shot RAG question: index the file, retrieve, answer.
async fn ask(config: ForgeConfig, file: &Path, question: &str) -> AppResult {
    if !config.llm.is_api_key_set() {
        return Err(AnalysisError::MissingApiKey.into());
    }
    let source = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    let retrieval = RetrievalEngine::from_config(&config)?;
    let (data_context, docs) = match load_path(file)? {
        LoadedContent::Tabular(dataset) => {
            let context = to_context(&dataset, config.analysis.max_context_rows);
            let docs = retrieval.documents_from_dataset_context(&context, &source);
            (context, docs)
        }
        LoadedContent::Document(text) => {
            let docs = retrieval.documents_from_text(&text, &source);
            (text, docs)
        }
        LoadedContent::Image(_) => {
            return Err(ForgeError::Ingest(format!("{} is an image", file.display())).into())
        }
    };
    retrieval.build(docs).await?;

    let chunks = retrieval.retrieve(question, None).await?;
    let engine = AnalysisEngine::from_config(&config.llm)?;
    let answer = engine
        .answer_question(question, &data_context, &format_context(&chunks))
        .await?;

    println!("{}", answer.to_markdown());
    if !chunks.is_empty() {
        println!("\nSources:");
        for chunk in &chunks {
            println!("  - {} (chunk {})", chunk.source, chunk.index);
        }
    }
    Ok(())
}
