//! Retrieval engine: chunking, embedding and nearest-neighbour lookup.

use std::sync::Arc;

use forge_core::config::RetrievalConfig;
use forge_core::error::ForgeError;
use forge_core::{DocumentChunk, ForgeConfig, IndexedChunk, SourceKind};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunker::{Chunker, ChunkerConfig};
use crate::embedding::{embedding_service_from_config, DynEmbeddingService};
use crate::index::{ScoredChunk, VectorIndex};

/// Returned by [`RetrievalEngine::context_for_query`] when nothing matches.
pub const NO_CONTEXT: &str = "No relevant context found in the knowledge base.";

/// Chunker, embedder and vector index behind one handle.
///
/// Methods take `&self`; the index is shared through interior locking, so
/// an engine can be wrapped in an `Arc` and used from several tasks.
pub struct RetrievalEngine {
    chunker: Chunker,
    embedder: Arc<dyn DynEmbeddingService>,
    index: VectorIndex,
    top_k: usize,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("chunker", &self.chunker.config())
            .field("embedder", &self.embedder.provider_name())
            .field("documents", &self.index.len())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl RetrievalEngine {
    pub fn new(
        config: &RetrievalConfig,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Result<Self, ForgeError> {
        if config.top_k == 0 {
            return Err(ForgeError::Config("top_k must be positive".into()));
        }
        let chunker = Chunker::new(ChunkerConfig::from(config))?;
        let index = VectorIndex::with_dimensions(embedder.dimensions());
        Ok(Self {
            chunker,
            embedder,
            index,
            top_k: config.top_k,
        })
    }

    /// Engine using the embedding backend selected by the configuration.
    pub fn from_config(config: &ForgeConfig) -> Result<Self, ForgeError> {
        let embedder = embedding_service_from_config(&config.embedding);
        Self::new(&config.retrieval, embedder)
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn embedder(&self) -> &Arc<dyn DynEmbeddingService> {
        &self.embedder
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Split text into chunks tagged with their source.
    pub fn create_documents(&self, text: &str, source: &str, kind: SourceKind) -> Vec<DocumentChunk> {
        self.chunker
            .split(text)
            .into_iter()
            .map(|span| DocumentChunk {
                id: Uuid::new_v4(),
                index: span.index,
                text: span.text,
                start: span.start,
                end: span.end,
                source: source.to_string(),
                kind,
            })
            .collect()
    }

    pub fn documents_from_dataset_context(&self, context: &str, source: &str) -> Vec<DocumentChunk> {
        self.create_documents(context, source, SourceKind::TabularData)
    }

    pub fn documents_from_text(&self, text: &str, source: &str) -> Vec<DocumentChunk> {
        self.create_documents(text, source, SourceKind::Document)
    }

    async fn embed_all(&self, docs: Vec<DocumentChunk>) -> Result<Vec<IndexedChunk>, ForgeError> {
        let mut out = Vec::with_capacity(docs.len());
        for chunk in docs {
            let embedding = self.embedder.embed_boxed(&chunk.text).await?;
            debug!(index = chunk.index, source = %chunk.source, "Embedded chunk");
            out.push(IndexedChunk { chunk, embedding });
        }
        Ok(out)
    }

    /// Replace the index contents with the given chunks.
    ///
    /// Everything is embedded before the swap, so a failure leaves the
    /// previous index untouched.
    pub async fn build(&self, docs: Vec<DocumentChunk>) -> Result<usize, ForgeError> {
        let indexed = self.embed_all(docs).await?;
        let count = indexed.len();
        self.index.replace(indexed)?;
        info!(chunks = count, "Vector index built");
        Ok(count)
    }

    /// Append chunks to the existing index.
    pub async fn add_documents(&self, docs: Vec<DocumentChunk>) -> Result<usize, ForgeError> {
        let indexed = self.embed_all(docs).await?;
        let count = indexed.len();
        self.index.extend(indexed)?;
        info!(added = count, total = self.index.len(), "Documents added to vector index");
        Ok(count)
    }

    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<DocumentChunk>, ForgeError> {
        Ok(self
            .retrieve_with_scores(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    /// The `k` chunks (default `top_k`) most similar to `query`, best first.
    ///
    /// Empty for an empty index, a blank query or `k == 0`.
    pub async fn retrieve_with_scores(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, ForgeError> {
        let k = k.unwrap_or(self.top_k);
        if self.index.is_empty() || query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_boxed(query).await?;
        let hits = self.index.search(&query_vec, k)?;
        debug!(k, hits = hits.len(), "Retrieved chunks");
        Ok(hits)
    }

    /// Retrieved chunks formatted as numbered context blocks for a prompt.
    pub async fn context_for_query(&self, query: &str, k: Option<usize>) -> Result<String, ForgeError> {
        let docs = self.retrieve(query, k).await?;
        Ok(format_context(&docs))
    }

    pub fn is_ready(&self) -> bool {
        !self.index.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.index.len()
    }

    pub fn clear(&self) -> Result<(), ForgeError> {
        self.index.clear()
    }

    pub fn snapshot(&self) -> Result<Vec<IndexedChunk>, ForgeError> {
        self.index.snapshot()
    }

    /// Load previously persisted chunks, replacing the index contents.
    pub fn restore(&self, chunks: Vec<IndexedChunk>) -> Result<usize, ForgeError> {
        let count = chunks.len();
        self.index.replace(chunks)?;
        info!(chunks = count, "Vector index restored");
        Ok(count)
    }
}

pub fn format_context(docs: &[DocumentChunk]) -> String {
    if docs.is_empty() {
        return NO_CONTEXT.to_string();
    }
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("--- Context {} (Source: {}) ---\n{}", i + 1, doc.source, doc.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;

    fn engine(chunk_size: usize, overlap: usize) -> RetrievalEngine {
        let config = RetrievalConfig {
            chunk_size,
            chunk_overlap: overlap,
            top_k: 3,
            prefer_separators: false,
        };
        RetrievalEngine::new(&config, Arc::new(HashingEmbedding::new(256))).unwrap()
    }

    const REPORT: &str = "Revenue in Europe grew twelve percent over the quarter. \
        Employee attrition in engineering stayed low. \
        Marketing spend on LinkedIn produced the best conversion rate. \
        Customer satisfaction in Asia Pacific dipped slightly.";

    #[test]
    fn test_new_rejects_bad_config() {
        let config = RetrievalConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            top_k: 3,
            prefer_separators: false,
        };
        assert!(RetrievalEngine::new(&config, Arc::new(HashingEmbedding::default())).is_err());
    }

    #[test]
    fn test_create_documents_metadata() {
        let engine = engine(40, 10);
        let docs = engine.documents_from_text(REPORT, "report.txt");
        assert!(docs.len() > 1);
        assert!(docs.iter().all(|d| d.source == "report.txt" && d.kind == SourceKind::Document));
        let docs = engine.documents_from_dataset_context("a b c", "sales.csv");
        assert_eq!(docs[0].kind, SourceKind::TabularData);
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let engine = engine(40, 10);
        assert!(!engine.is_ready());
        assert!(engine.retrieve("revenue", None).await.unwrap().is_empty());
        assert_eq!(engine.context_for_query("revenue", None).await.unwrap(), NO_CONTEXT);
    }

    #[tokio::test]
    async fn test_build_and_retrieve_ranks_relevant_chunk_first() {
        let engine = engine(60, 0);
        let docs = engine.documents_from_text(REPORT, "report.txt");
        let count = engine.build(docs).await.unwrap();
        assert_eq!(engine.document_count(), count);
        assert!(engine.is_ready());

        let hits = engine.retrieve_with_scores("LinkedIn marketing conversion", Some(1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.contains("LinkedIn"));
    }

    #[tokio::test]
    async fn test_retrieve_defaults_to_top_k_and_sorts() {
        let engine = engine(30, 5);
        engine.build(engine.documents_from_text(REPORT, "r")).await.unwrap();
        let hits = engine.retrieve_with_scores("revenue", None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_blank_query_and_zero_k() {
        let engine = engine(40, 10);
        engine.build(engine.documents_from_text(REPORT, "r")).await.unwrap();
        assert!(engine.retrieve("   ", None).await.unwrap().is_empty());
        assert!(engine.retrieve("revenue", Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_replaces_and_add_appends() {
        let engine = engine(40, 10);
        let first = engine.build(engine.documents_from_text(REPORT, "a")).await.unwrap();
        let second = engine.build(engine.documents_from_text("short note", "b")).await.unwrap();
        assert_eq!(second, 1);
        assert_eq!(engine.document_count(), 1);

        engine.add_documents(engine.documents_from_text(REPORT, "a")).await.unwrap();
        assert_eq!(engine.document_count(), 1 + first);
    }

    #[tokio::test]
    async fn test_context_format() {
        let engine = engine(1000, 0);
        engine.build(engine.documents_from_text(REPORT, "report.txt")).await.unwrap();
        let ctx = engine.context_for_query("revenue", Some(5)).await.unwrap();
        assert!(ctx.starts_with("--- Context 1 (Source: report.txt) ---\n"));
        assert!(ctx.ends_with("dipped slightly."));
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let source = engine(40, 10);
        source.build(source.documents_from_text(REPORT, "r")).await.unwrap();
        let snapshot = source.snapshot().unwrap();

        let target = engine(40, 10);
        target.restore(snapshot.clone()).unwrap();
        assert_eq!(target.document_count(), snapshot.len());
        let a = source.retrieve("attrition", Some(2)).await.unwrap();
        let b = target.retrieve("attrition", Some(2)).await.unwrap();
        assert_eq!(a, b);

        source.clear().unwrap();
        assert_eq!(source.document_count(), 0);
    }

    #[tokio::test]
    async fn test_restore_rejects_other_dimension() {
        let engine = engine(40, 10);
        let foreign = RetrievalEngine::new(
            &RetrievalConfig {
                chunk_size: 40,
                chunk_overlap: 10,
                top_k: 3,
                prefer_separators: false,
            },
            Arc::new(HashingEmbedding::new(8)),
        )
        .unwrap();
        foreign.build(foreign.documents_from_text(REPORT, "r")).await.unwrap();
        let err = engine.restore(foreign.snapshot().unwrap()).unwrap_err();
        assert!(matches!(err, ForgeError::DimensionMismatch { expected: 256, actual: 8 }));
    }

    #[test]
    fn test_format_context_numbering() {
        let engine = engine(5, 0);
        let docs = engine.documents_from_text("abcdefghij", "x.txt");
        assert_eq!(
            format_context(&docs),
            "--- Context 1 (Source: x.txt) ---\nabcde\n\n--- Context 2 (Source: x.txt) ---\nfghij"
        );
    }
}
