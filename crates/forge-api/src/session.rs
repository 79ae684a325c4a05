//! The single dashboard session: active data, vector index, chat and the
//! last analysis results.
//!
//! Every user action runs load → retrieve → model call to completion before
//! returning. The HTTP layer serializes access through a mutex, so methods
//! here take `&mut self` freely.

use std::sync::Arc;

use forge_analysis::{AnalysisEngine, AnalysisError, CompletionProvider, VisualizationSuggestion};
use forge_core::error::ForgeError;
use forge_core::{AnalysisResult, CellValue, ChatTurn, Dataset, ForgeConfig};
use forge_loader::{
    load_bytes, load_path, sample, to_context, DataProfile, FileKind, IngestError,
    LoadedContent, StoredFile, UploadStore,
};
use forge_retrieval::{format_context, DynEmbeddingService, RetrievalEngine, ScoredChunk};
use forge_storage::{Database, StoreSummary, VectorStoreRepository};
use forge_viz::{auto_visualize, build_chart, compute_kpi_cards, ChartRequest, ChartSpec, KpiCard, VizError};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Retrieval query used for the overview analysis.
pub const ANALYSIS_QUERY: &str = "Analyze key trends, patterns, and provide business recommendations";

/// Prefix of the assistant turn recorded when a question fails.
pub const ASK_ERROR_PREFIX: &str = "Sorry, I encountered an error:";

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no data loaded; upload a file or load a sample dataset first")]
    NoDataLoaded,
    #[error("'{0}' is a document; this view needs tabular data")]
    NotTabular(String),
    #[error("AI analysis is disabled; enter an OpenAI API key to enable it")]
    AnalysisDisabled,
    #[error("unknown sample dataset: '{0}'")]
    UnknownSample(String),
    #[error("saved index not found: '{0}'")]
    IndexNotFound(String),
    #[error("vector store persistence is not available")]
    StorageUnavailable,
    #[error("saved index '{name}' was built with the '{stored}' embedder, but this session uses '{current}'")]
    EmbedderMismatch {
        name: String,
        stored: String,
        current: String,
    },
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Viz(#[from] VizError),
    #[error(transparent)]
    Forge(#[from] ForgeError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Parsed content of the active file.
#[derive(Debug, Clone)]
pub enum SourceContent {
    Tabular(Dataset),
    Document(String),
}

/// The file the dashboard is currently showing.
#[derive(Debug, Clone)]
pub struct ActiveSource {
    pub file_name: String,
    pub content: SourceContent,
    /// Text handed to the model as the data context.
    pub context: String,
}

impl ActiveSource {
    pub fn kind(&self) -> &'static str {
        match self.content {
            SourceContent::Tabular(_) => "tabular",
            SourceContent::Document(_) => "document",
        }
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        match &self.content {
            SourceContent::Tabular(ds) => Some(ds),
            SourceContent::Document(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub file_name: Option<String>,
    pub kind: Option<&'static str>,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub indexed_chunks: usize,
    pub analysis_enabled: bool,
    pub chat_turns: usize,
    pub embedder: &'static str,
    /// Saved index currently backing retrieval, when one was loaded.
    pub loaded_index: Option<String>,
}

/// Outcome of activating a file or sample.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub file_name: String,
    pub kind: &'static str,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub characters: Option<usize>,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: AnalysisResult,
    pub sources: Vec<ScoredChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestions {
    pub result: AnalysisResult,
    pub suggestions: Vec<VisualizationSuggestion>,
}

pub struct Session {
    config: ForgeConfig,
    uploads: UploadStore,
    retrieval: RetrievalEngine,
    analysis: Option<AnalysisEngine>,
    stores: Option<VectorStoreRepository>,
    active: Option<ActiveSource>,
    loaded_index: Option<String>,
    chat: Vec<ChatTurn>,
    last_analysis: Option<AnalysisResult>,
    last_image_analysis: Option<AnalysisResult>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uploads", &self.uploads.dir())
            .field("retrieval", &self.retrieval)
            .field("analysis_enabled", &self.analysis.is_some())
            .field("active", &self.active.as_ref().map(|a| a.file_name.as_str()))
            .field("chat_turns", &self.chat.len())
            .finish()
    }
}

impl Session {
    /// Build a session. Analysis is enabled when the configuration carries
    /// an API key; `db` enables saving and loading vector stores.
    pub fn new(
        config: ForgeConfig,
        embedder: Arc<dyn DynEmbeddingService>,
        db: Option<Arc<Database>>,
    ) -> Result<Self> {
        let uploads = UploadStore::new(
            config.uploads_dir(),
            config.upload.max_upload_bytes(),
            config.upload.allowed_extensions.clone(),
        );
        let retrieval = RetrievalEngine::new(&config.retrieval, embedder)?;
        let analysis = engine_from_config(&config);
        Ok(Self {
            uploads,
            retrieval,
            analysis,
            stores: db.map(VectorStoreRepository::new),
            active: None,
            loaded_index: None,
            chat: Vec::new(),
            last_analysis: None,
            last_image_analysis: None,
            config,
        })
    }

    /// Enable analysis with an injected completion provider.
    pub fn with_completion_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        self.analysis = Some(AnalysisEngine::with_provider(provider, &self.config.llm)?);
        Ok(self)
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn analysis_enabled(&self) -> bool {
        self.analysis.is_some()
    }

    /// Replace the API key. A blank key disables analysis.
    pub fn set_api_key(&mut self, key: &str) -> bool {
        self.config.llm.api_key = key.trim().to_string();
        self.analysis = engine_from_config(&self.config);
        info!(enabled = self.analysis.is_some(), "API key updated");
        self.analysis.is_some()
    }

    pub fn active(&self) -> Option<&ActiveSource> {
        self.active.as_ref()
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Parse an upload, store it and make it the active source.
    ///
    /// The bytes are parsed before anything is written. If activation still
    /// fails, the previous copy of a same-named file is put back, so the
    /// previous source and its stored file both survive.
    pub async fn ingest_upload(&mut self, name: &str, bytes: Vec<u8>) -> Result<IngestSummary> {
        if matches!(self.uploads.check(name, bytes.len())?, FileKind::Image) {
            return Err(IngestError::UnsupportedFormat(format!(
                "{} (images go through image analysis)",
                name
            ))
            .into());
        }

        let file_name = name.to_string();
        let (bytes, loaded) = tokio::task::spawn_blocking(move || {
            let loaded = load_bytes(&file_name, &bytes);
            (bytes, loaded)
        })
        .await
        .map_err(|e| ForgeError::Ingest(format!("loader task failed: {}", e)))?;
        let content = loaded?;

        let previous = self.uploads.read(name)?;
        let stored = self.uploads.save(name, &bytes)?;
        let outcome = self.activate(&stored.name, content).await;
        if outcome.is_err() {
            self.restore_upload(&stored.name, previous);
        }
        outcome
    }

    fn restore_upload(&self, name: &str, previous: Option<Vec<u8>>) {
        let restored = match previous {
            Some(bytes) => self.uploads.save(name, &bytes).map(|_| ()),
            None => self.uploads.delete(name),
        };
        if let Err(e) = restored {
            warn!(file = %name, error = %e, "Failed to roll back rejected upload");
        }
    }

    /// Store an image and describe it with the model.
    pub async fn ingest_image(&mut self, name: &str, bytes: Vec<u8>, prompt: &str) -> Result<AnalysisResult> {
        let engine = self.analysis.as_ref().ok_or(SessionError::AnalysisDisabled)?;
        if !matches!(FileKind::detect(name)?, FileKind::Image) {
            return Err(IngestError::UnsupportedFormat(name.to_string()).into());
        }
        let stored = self.uploads.save(name, &bytes)?;
        let result = engine
            .analyze_image(&bytes, image_mime(&stored.name), prompt)
            .await?;
        self.last_image_analysis = Some(result.clone());
        Ok(result)
    }

    /// Activate one of the generated sample datasets (`sales`, `hr`,
    /// `marketing`).
    pub async fn load_sample(&mut self, name: &str) -> Result<IngestSummary> {
        if !sample::is_sample(name) {
            return Err(SessionError::UnknownSample(name.to_string()));
        }
        let dataset = sample::generate(name)?;
        self.activate(&sample::file_name(name), LoadedContent::Tabular(dataset))
            .await
    }

    /// Parse an already-uploaded file and make it the active source.
    pub async fn activate_file(&mut self, name: &str) -> Result<IngestSummary> {
        let path = self.uploads.path_of(name)?;
        if !path.is_file() {
            return Err(IngestError::NotFound(name.to_string()).into());
        }
        let content = tokio::task::spawn_blocking(move || load_path(&path))
            .await
            .map_err(|e| ForgeError::Ingest(format!("loader task failed: {}", e)))??;
        self.activate(name, content).await
    }

    /// Activate the newest tabular or document upload, if any.
    pub async fn auto_load_latest(&mut self) -> Option<IngestSummary> {
        let files = match self.uploads.list() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Could not list uploads for auto-load");
                return None;
            }
        };
        let latest = files.into_iter().find(|f| f.kind != "image")?;
        match self.activate_file(&latest.name).await {
            Ok(summary) => {
                info!(file = %summary.file_name, "Auto-loaded latest upload");
                Some(summary)
            }
            Err(e) => {
                warn!(file = %latest.name, error = %e, "Auto-load of latest upload failed");
                None
            }
        }
    }

    async fn activate(&mut self, file_name: &str, content: LoadedContent) -> Result<IngestSummary> {
        let max_rows = self.config.analysis.max_context_rows;
        let (content, context, docs) = match content {
            LoadedContent::Tabular(ds) => {
                let context = to_context(&ds, max_rows);
                let docs = self.retrieval.documents_from_dataset_context(&context, file_name);
                (SourceContent::Tabular(ds), context, docs)
            }
            LoadedContent::Document(text) => {
                let docs = self.retrieval.documents_from_text(&text, file_name);
                (SourceContent::Document(text.clone()), text, docs)
            }
            LoadedContent::Image(_) => {
                return Err(IngestError::UnsupportedFormat(file_name.to_string()).into());
            }
        };

        let chunks = self.retrieval.build(docs).await?;
        let source = ActiveSource {
            file_name: file_name.to_string(),
            content,
            context,
        };
        let summary = IngestSummary {
            file_name: source.file_name.clone(),
            kind: source.kind(),
            rows: source.dataset().map(Dataset::row_count),
            columns: source.dataset().map(Dataset::column_count),
            characters: match &source.content {
                SourceContent::Document(text) => Some(text.chars().count()),
                SourceContent::Tabular(_) => None,
            },
            chunks,
        };

        self.active = Some(source);
        self.loaded_index = None;
        self.chat.clear();
        self.last_analysis = None;
        info!(file = file_name, kind = summary.kind, chunks, "Active source replaced");
        Ok(summary)
    }

    // =========================================================================
    // Dataset views
    // =========================================================================

    pub fn status(&self) -> SessionStatus {
        let active = self.active.as_ref();
        let dataset = active.and_then(ActiveSource::dataset);
        SessionStatus {
            file_name: active.map(|a| a.file_name.clone()),
            kind: active.map(ActiveSource::kind),
            rows: dataset.map(Dataset::row_count),
            columns: dataset.map(Dataset::column_count),
            indexed_chunks: self.retrieval.document_count(),
            analysis_enabled: self.analysis.is_some(),
            chat_turns: self.chat.len(),
            embedder: self.retrieval.embedder().provider_name(),
            loaded_index: self.loaded_index.clone(),
        }
    }

    fn source(&self) -> Result<&ActiveSource> {
        self.active.as_ref().ok_or(SessionError::NoDataLoaded)
    }

    fn dataset(&self) -> Result<&Dataset> {
        let source = self.source()?;
        source
            .dataset()
            .ok_or_else(|| SessionError::NotTabular(source.file_name.clone()))
    }

    pub fn profile(&self) -> Result<DataProfile> {
        Ok(forge_loader::profile(self.dataset()?))
    }

    pub fn preview(&self, rows: usize) -> Result<Preview> {
        let ds = self.dataset()?;
        let take = rows.min(ds.row_count());
        let rows: Vec<Vec<CellValue>> = (0..take)
            .filter_map(|i| ds.row(i))
            .map(|row| row.into_iter().cloned().collect::<Vec<_>>())
            .collect();
        Ok(Preview {
            columns: ds.column_names().into_iter().map(str::to_string).collect(),
            rows,
            total_rows: ds.row_count(),
        })
    }

    pub fn charts(&self) -> Result<Vec<ChartSpec>> {
        Ok(auto_visualize(self.dataset()?))
    }

    pub fn chart(&self, request: &ChartRequest) -> Result<ChartSpec> {
        Ok(build_chart(self.dataset()?, request)?)
    }

    pub fn kpis(&self) -> Result<Vec<KpiCard>> {
        Ok(compute_kpi_cards(self.dataset()?))
    }

    // =========================================================================
    // Analysis
    // =========================================================================

    fn engine(&self) -> Result<&AnalysisEngine> {
        self.analysis.as_ref().ok_or(SessionError::AnalysisDisabled)
    }

    /// Five-section overview of the active source.
    pub async fn analyze(&mut self) -> Result<AnalysisResult> {
        let engine = self.engine()?;
        let source = self.source()?;
        let rag = self.retrieval.context_for_query(ANALYSIS_QUERY, None).await?;
        let result = engine.analyze_data(&source.context, &rag).await?;
        self.last_analysis = Some(result.clone());
        Ok(result)
    }

    pub async fn custom_analysis(&mut self, request: &str) -> Result<AnalysisResult> {
        let engine = self.engine()?;
        let source = self.source()?;
        let rag = self.retrieval.context_for_query(request, None).await?;
        let result = engine.custom_analysis(request, &source.context, &rag).await?;
        self.last_analysis = Some(result.clone());
        Ok(result)
    }

    pub fn last_analysis(&self) -> Option<&AnalysisResult> {
        self.last_analysis.as_ref()
    }

    pub fn last_image_analysis(&self) -> Option<&AnalysisResult> {
        self.last_image_analysis.as_ref()
    }

    /// Answer a question from retrieved chunks and record both turns.
    ///
    /// Works with active data, a loaded index, or both. A model failure is
    /// recorded in the history as an apology before being returned.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let question = question.trim();
        let Some(engine) = self.analysis.as_ref() else {
            return Err(SessionError::AnalysisDisabled);
        };
        if self.active.is_none() && !self.retrieval.is_ready() {
            return Err(SessionError::NoDataLoaded);
        }
        if question.is_empty() {
            return Err(AnalysisError::EmptyPrompt.into());
        }

        let sources = self.retrieval.retrieve_with_scores(question, None).await?;
        let chunks: Vec<_> = sources.iter().map(|s| s.chunk.clone()).collect();
        let rag = format_context(&chunks);
        let data_context = self.active.as_ref().map_or("", |a| a.context.as_str());
        debug!(question, sources = sources.len(), "Answering question");

        let outcome = engine.answer_question(question, data_context, &rag).await;
        let max_turns = self.config.analysis.max_chat_history;
        self.chat.push(ChatTurn::user(question));
        let reply = match outcome {
            Ok(answer) => {
                self.chat.push(ChatTurn::assistant(answer.to_markdown()));
                Ok(Answer { answer, sources })
            }
            Err(e) => {
                warn!(error = %e, "Question failed");
                self.chat
                    .push(ChatTurn::assistant(format!("{} {}", ASK_ERROR_PREFIX, e)));
                Err(e.into())
            }
        };
        trim_history(&mut self.chat, max_turns);
        reply
    }

    /// Free-form conversation turn. Active data and retrieved chunks are
    /// passed along when available; unlike `ask`, no data is required.
    pub async fn chat(&mut self, message: &str) -> Result<String> {
        let message = message.trim();
        let engine = self.engine()?;
        let rag = if self.retrieval.is_ready() && !message.is_empty() {
            self.retrieval.context_for_query(message, None).await?
        } else {
            String::new()
        };
        let data_context = self.active.as_ref().map_or("", |a| a.context.as_str());

        let reply = engine.chat(message, data_context, &rag).await?;
        self.chat.push(ChatTurn::user(message));
        self.chat.push(ChatTurn::assistant(reply.clone()));
        trim_history(&mut self.chat, self.config.analysis.max_chat_history);
        Ok(reply)
    }

    /// Round-trip a short prompt through the configured model.
    pub async fn test_connection(&self) -> Result<bool> {
        Ok(self.engine()?.test_connection().await)
    }

    pub fn chat_history(&self) -> &[ChatTurn] {
        &self.chat
    }

    pub fn clear_chat(&mut self) {
        self.chat.clear();
    }

    pub async fn suggest_visualizations(&self) -> Result<Suggestions> {
        let engine = self.engine()?;
        let ds = self.dataset()?;
        let context = to_context(ds, self.config.analysis.max_context_rows);
        let (result, suggestions) = engine.suggest_visualizations(&context).await?;
        Ok(Suggestions { result, suggestions })
    }

    /// Raw nearest chunks for `query`. Empty when nothing is indexed.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        Ok(self.retrieval.retrieve_with_scores(query, k).await?)
    }

    // =========================================================================
    // Files and saved indexes
    // =========================================================================

    pub fn list_files(&self) -> Result<Vec<StoredFile>> {
        Ok(self.uploads.list()?)
    }

    /// Delete an upload. Returns true when it was the active file, in which
    /// case the session is cleared.
    pub fn delete_file(&mut self, name: &str) -> Result<bool> {
        self.uploads.delete(name)?;
        let was_active = self.active.as_ref().is_some_and(|a| a.file_name == name);
        if was_active {
            self.clear()?;
        }
        Ok(was_active)
    }

    fn stores(&self) -> Result<&VectorStoreRepository> {
        self.stores.as_ref().ok_or(SessionError::StorageUnavailable)
    }

    /// Persist the current index under `name`; returns the normalized name.
    pub fn save_index(&self, name: &str) -> Result<String> {
        let stores = self.stores()?;
        if !self.retrieval.is_ready() {
            return Err(SessionError::NoDataLoaded);
        }
        let chunks = self.retrieval.snapshot()?;
        let embedder = self.retrieval.embedder().provider_name();
        Ok(stores.save(name, embedder, &chunks)?)
    }

    /// Replace the index with a saved store; returns the chunk count.
    ///
    /// The store must come from the same embedding backend as this session.
    /// Loading drops the active source, so answers draw only on the store.
    pub fn load_index(&mut self, name: &str) -> Result<usize> {
        let store = self
            .stores()?
            .load(name)?
            .ok_or_else(|| SessionError::IndexNotFound(name.to_string()))?;

        let current = self.retrieval.embedder().provider_name();
        if store.embedder.is_empty() {
            warn!(store = name, "Saved index has no embedder label; assuming it matches");
        } else if store.embedder != current {
            return Err(SessionError::EmbedderMismatch {
                name: name.to_string(),
                stored: store.embedder,
                current: current.to_string(),
            });
        }

        let count = self.retrieval.restore(store.chunks)?;
        self.active = None;
        self.loaded_index = Some(forge_storage::normalize_store_name(name)?);
        self.chat.clear();
        self.last_analysis = None;
        info!(store = name, chunks = count, "Saved index loaded");
        Ok(count)
    }

    pub fn list_indexes(&self) -> Result<Vec<StoreSummary>> {
        Ok(self.stores()?.list()?)
    }

    /// Drop active data, index, chat and analysis results.
    pub fn clear(&mut self) -> Result<()> {
        self.retrieval.clear()?;
        self.active = None;
        self.loaded_index = None;
        self.chat.clear();
        self.last_analysis = None;
        self.last_image_analysis = None;
        info!("Session cleared");
        Ok(())
    }
}

fn engine_from_config(config: &ForgeConfig) -> Option<AnalysisEngine> {
    if !config.llm.is_api_key_set() {
        warn!("OpenAI API key not set; AI analysis disabled");
        return None;
    }
    match AnalysisEngine::from_config(&config.llm) {
        Ok(engine) => Some(engine),
        Err(e) => {
            warn!(error = %e, "Analysis engine unavailable");
            None
        }
    }
}

fn image_mime(name: &str) -> &'static str {
    match forge_loader::file_extension(name).as_str() {
        "png" => "image/png",
        _ => "image/jpeg",
    }
}

fn trim_history(turns: &mut Vec<ChatTurn>, max: usize) {
    if max > 0 && turns.len() > max {
        let excess = turns.len() - max;
        turns.drain(..excess);
    }
}
