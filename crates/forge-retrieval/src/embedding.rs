//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX model (e.g.
//!   all-MiniLM-L6-v2) via ort and tokenizes with the HuggingFace tokenizers
//!   crate.
//! - `HashingEmbedding` feature-hashes words and character trigrams into a
//!   fixed number of buckets. It needs no model files, so it backs offline
//!   runs and tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use forge_core::config::EmbeddingConfig;
use forge_core::error::ForgeError;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::Tokenizer;
use tracing::{info, warn};

/// Service for generating text embeddings.
pub trait EmbeddingService: Send + Sync {
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, ForgeError>> + Send;

    /// Length of every vector this service produces.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Every `EmbeddingService` implements this through the blanket impl below,
/// so engines can hold an `Arc<dyn DynEmbeddingService>`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, ForgeError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;

    /// Short provider label for logs and status output.
    fn provider_name(&self) -> &'static str;
}

impl<T: EmbeddingService + NamedProvider> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, ForgeError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }

    fn provider_name(&self) -> &'static str {
        T::NAME
    }
}

/// Label attached to each embedding backend.
pub trait NamedProvider {
    const NAME: &'static str;
}

/// Pick the embedding backend described by the configuration.
///
/// `onnx` falls back to hashing, with a warning, when the model directory
/// cannot be loaded.
pub fn embedding_service_from_config(config: &EmbeddingConfig) -> Arc<dyn DynEmbeddingService> {
    match config.provider.as_str() {
        "hashing" => Arc::new(HashingEmbedding::new(config.dimensions)),
        other => {
            if other != "onnx" {
                warn!(provider = other, "Unknown embedding provider, trying onnx");
            }
            let dir = config.model_dir();
            match OnnxEmbeddingService::from_directory(&dir) {
                Ok(service) => Arc::new(service),
                Err(e) => {
                    warn!(
                        model_dir = %dir.display(),
                        error = %e,
                        "Embedding model unavailable, falling back to hashing embedder"
                    );
                    Arc::new(HashingEmbedding::new(config.dimensions))
                }
            }
        }
    }
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in values.iter_mut() {
            *val /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - ONNX Runtime inference
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed sentence-transformer.
///
/// Expects a model directory containing `model.onnx` and `tokenizer.json`.
/// The model takes `input_ids`, `attention_mask` and `token_type_ids` and
/// yields token embeddings, which are mean-pooled over the attention mask.
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
}

// ort::Session is Send + Sync internally (uses Arc<SharedSessionInner>).
unsafe impl Send for OnnxEmbeddingService {}
unsafe impl Sync for OnnxEmbeddingService {}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl NamedProvider for OnnxEmbeddingService {
    const NAME: &'static str = "onnx";
}

fn onnx_err(context: &str, e: impl std::fmt::Display) -> ForgeError {
    ForgeError::Embedding(format!("{}: {}", context, e))
}

impl OnnxEmbeddingService {
    pub fn from_directory(model_dir: &Path) -> Result<Self, ForgeError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
        )
    }

    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, ForgeError> {
        for (what, path) in [("ONNX model", model_path), ("Tokenizer", tokenizer_path)] {
            if !path.exists() {
                return Err(ForgeError::Embedding(format!(
                    "{} not found at {}",
                    what,
                    path.display()
                )));
            }
        }

        let session = Session::builder()
            .map_err(|e| onnx_err("ONNX session builder", e))?
            .with_intra_threads(1)
            .map_err(|e| onnx_err("ONNX set threads", e))?
            .commit_from_file(model_path)
            .map_err(|e| onnx_err("ONNX load model", e))?;

        // Output is [batch, seq_len, hidden_dim]; fall back to MiniLM's 384.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { 384 })
            .unwrap_or(384);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| onnx_err("Failed to load tokenizer", e))?;

        info!(model = %model_path.display(), dimensions, "Loaded ONNX embedding model");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
        })
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, ForgeError> {
        if text.is_empty() {
            return Err(ForgeError::Embedding("Cannot embed empty text".to_string()));
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| onnx_err("Tokenization failed", e))?;

        let to_i64 = |v: &[u32]| v.iter().map(|&x| x as i64).collect::<Vec<i64>>();
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let token_type_ids = to_i64(encoding.get_type_ids());
        let seq_len = input_ids.len();

        let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| onnx_err("input_ids array", e))?;
        let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| onnx_err("attention_mask array", e))?;
        let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| onnx_err("token_type_ids array", e))?;

        let ids_ref =
            TensorRef::from_array_view(&ids_array).map_err(|e| onnx_err("TensorRef input_ids", e))?;
        let mask_ref = TensorRef::from_array_view(&mask_array)
            .map_err(|e| onnx_err("TensorRef attention_mask", e))?;
        let type_ref = TensorRef::from_array_view(&type_array)
            .map_err(|e| onnx_err("TensorRef token_type_ids", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| onnx_err("Session lock poisoned", e))?;
        let outputs = session
            .run(ort::inputs![ids_ref, mask_ref, type_ref])
            .map_err(|e| onnx_err("ONNX inference failed", e))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| onnx_err("Extract embeddings", e))?;

        let hidden_dim = match shape.iter().copied().collect::<Vec<i64>>().as_slice() {
            [.., _, last] => *last as usize,
            other => {
                return Err(ForgeError::Embedding(format!(
                    "Unexpected output shape: {:?}",
                    other
                )))
            }
        };

        let mut pooled = mean_pool(data, &attention_mask, hidden_dim);
        l2_normalize(&mut pooled);
        Ok(pooled)
    }
}

/// Average the token vectors whose attention mask is set.
fn mean_pool(token_embeddings: &[f32], attention_mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;
    for (tok_idx, &mask) in attention_mask.iter().enumerate() {
        if mask <= 0 {
            continue;
        }
        let offset = tok_idx * hidden_dim;
        if let Some(token) = token_embeddings.get(offset..offset + hidden_dim) {
            for (acc, v) in pooled.iter_mut().zip(token) {
                *acc += v;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for val in &mut pooled {
            *val /= count;
        }
    }
    pooled
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ForgeError> {
        // Inference is CPU-bound; keep it off the async workers.
        let svc = OnnxEmbeddingService {
            session: Arc::clone(&self.session),
            tokenizer: Arc::clone(&self.tokenizer),
            dimensions: self.dimensions,
        };
        let text_owned = text.to_string();

        tokio::task::spawn_blocking(move || svc.embed_sync(&text_owned))
            .await
            .map_err(|e| onnx_err("Embedding task panicked", e))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// HashingEmbedding - model-free feature hashing
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedding.
///
/// Lower-cased alphanumeric words and their character trigrams are hashed
/// into signed buckets, then the vector is L2-normalized. Texts sharing
/// vocabulary score a positive cosine similarity, so ranking is meaningful
/// without a model.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimensions: usize,
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl NamedProvider for HashingEmbedding {
    const NAME: &'static str = "hashing";
}

impl HashingEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, feature: &str, salt: u8) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        salt.hash(&mut hasher);
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let index = (h % self.dimensions as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let (i, sign) = self.bucket(word, 0);
            vector[i] += sign;

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for tri in padded.windows(3) {
                let gram: String = tri.iter().collect();
                let (i, sign) = self.bucket(&gram, 1);
                vector[i] += 0.5 * sign;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingService for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ForgeError> {
        if text.is_empty() {
            return Err(ForgeError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
