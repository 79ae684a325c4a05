//! InsightForge retrieval crate - chunking, embeddings, vector index and the
//! retrieval engine that ties them together.
//!
//! Text is split into overlapping character windows, each window is embedded
//! by an [`EmbeddingService`], and queries return the nearest chunks by
//! cosine similarity.

pub mod chunker;
pub mod embedding;
pub mod engine;
pub mod index;

pub use chunker::{reconstruct, Chunker, ChunkerConfig, TextSpan};
pub use embedding::{
    embedding_service_from_config, DynEmbeddingService, EmbeddingService, HashingEmbedding,
    OnnxEmbeddingService,
};
pub use engine::{format_context, RetrievalEngine, NO_CONTEXT};
pub use index::{cosine_similarity, ScoredChunk, VectorIndex};
