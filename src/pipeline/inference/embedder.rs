use std::sync::Arc;

use super::ModelError;
use crate::pipeline::ollama::EmbedClient;

/// Hidden size of the clinical BERT family used for note embeddings.
pub const CLINICAL_BERT_DIM: usize = 768;

/// BERT position limit; longer inputs are truncated.
pub const MAX_SEQUENCE_LEN: usize = 512;

/// Text in, fixed-length vector out.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

// ═══════════════════════════════════════════════════════════
// Ollama embedder
// ═══════════════════════════════════════════════════════════

/// Embeddings served by Ollama's `/api/embed`.
///
/// The dimension is probed once on connect so a model swap on the server
/// surfaces as `DimensionMismatch` instead of silently changing vector sizes.
pub struct OllamaEmbedder {
    client: Arc<dyn EmbedClient>,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn connect(client: Arc<dyn EmbedClient>, model: &str) -> Result<Self, ModelError> {
        let probe = client.embed(model, &["dimension probe"])?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .filter(|&d| d > 0)
            .ok_or_else(|| ModelError::ModelInit(format!("'{model}' returned an empty embedding")))?;

        tracing::info!(model, dimension, "Ollama embedder ready");
        Ok(Self {
            client,
            model: model.to_string(),
            dimension,
        })
    }

    fn check(&self, vector: Vec<f32>) -> Result<Vec<f32>, ModelError> {
        if vector.len() != self.dimension {
            return Err(ModelError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

impl EmbeddingModel for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| ModelError::Embedding("empty response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.client
            .embed(&self.model, texts)?
            .into_iter()
            .map(|v| self.check(v))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX embedder, behind `onnx-embeddings` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use super::{EmbeddingModel, ModelError, CLINICAL_BERT_DIM, MAX_SEQUENCE_LEN};
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// Clinical BERT exported to ONNX, mean-pooled over the attention mask.
    ///
    /// `model_dir` holds `model.onnx` and `tokenizer.json`. The session sits
    /// behind a Mutex because `Session::run` needs `&mut self`.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(ModelError::ModelNotFound(model_path));
            }
            if !tokenizer_path.exists() {
                return Err(ModelError::ModelNotFound(tokenizer_path));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| ModelError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| ModelError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| ModelError::ModelInit(format!("ONNX load failed: {e}")))?;

            let mut tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| ModelError::ModelInit(format!("Tokenizer load failed: {e}")))?;
            tokenizer
                .with_truncation(Some(tokenizers::TruncationParams {
                    max_length: MAX_SEQUENCE_LEN,
                    ..Default::default()
                }))
                .map_err(|e| ModelError::ModelInit(format!("Truncation setup failed: {e}")))?;

            tracing::info!(dir = %model_dir.display(), "ONNX clinical embedder loaded");

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
            })
        }

        fn infer(&self, text: &str) -> Result<Vec<f32>, ModelError> {
            use ort::value::TensorRef;

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| ModelError::Tokenization(e.to_string()))?;

            let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let attention_mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect();
            let token_type_ids: Vec<i64> =
                encoding.get_type_ids().iter().map(|&t| t as i64).collect();
            let seq_len = input_ids.len();

            let to_array = |v: Vec<i64>| {
                ndarray::Array2::from_shape_vec((1, seq_len), v)
                    .map_err(|e| ModelError::Embedding(e.to_string()))
            };
            let ids_array = to_array(input_ids)?;
            let mask_array = to_array(attention_mask.clone())?;
            let type_array = to_array(token_type_ids)?;

            let ids_tensor = TensorRef::from_array_view(&ids_array)
                .map_err(|e| ModelError::Embedding(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask_array)
                .map_err(|e| ModelError::Embedding(e.to_string()))?;
            let type_tensor = TensorRef::from_array_view(&type_array)
                .map_err(|e| ModelError::Embedding(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| ModelError::Embedding("Session lock poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
                .map_err(|e| ModelError::Embedding(format!("ONNX inference failed: {e}")))?;

            // last_hidden_state: [1, seq_len, hidden]
            let (shape, hidden) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::Embedding(format!("Output extraction: {e}")))?;
            if shape.len() != 3 || shape[2] as usize != CLINICAL_BERT_DIM {
                return Err(ModelError::DimensionMismatch {
                    expected: CLINICAL_BERT_DIM,
                    actual: shape.last().copied().unwrap_or(0) as usize,
                });
            }

            Ok(super::mean_pool(hidden, &attention_mask, CLINICAL_BERT_DIM))
        }
    }

    impl EmbeddingModel for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
            self.infer(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            texts.iter().map(|t| self.infer(t)).collect()
        }

        fn dimension(&self) -> usize {
            CLINICAL_BERT_DIM
        }

        fn model_name(&self) -> &str {
            "bio-clinical-bert-onnx"
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxEmbedder;

/// Average token vectors where the mask is set. `hidden` is row-major
/// `[tokens, dim]`. Returns zeros when the mask is empty.
#[cfg_attr(not(feature = "onnx-embeddings"), allow(dead_code))]
fn mean_pool(hidden: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut mask_sum = 0.0f32;

    for (token_idx, &m) in mask.iter().enumerate() {
        let weight = m as f32;
        if weight == 0.0 {
            continue;
        }
        mask_sum += weight;
        let row = &hidden[token_idx * dim..(token_idx + 1) * dim];
        for (p, h) in pooled.iter_mut().zip(row) {
            *p += h * weight;
        }
    }

    if mask_sum > 0.0 {
        for p in &mut pooled {
            *p /= mask_sum;
        }
    }
    pooled
}

// ═══════════════════════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════════════════════

/// Mock embedding model for testing. Produces deterministic vectors.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: CLINICAL_BERT_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(deterministic_vector(text, self.dimension))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts
            .iter()
            .map(|t| deterministic_vector(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

/// Deterministic unit vector derived from the text bytes.
fn deterministic_vector(text: &str, dim: usize) -> Vec<f32> {
    let bytes = text.as_bytes();
    let mut vec: Vec<f32> = (0..dim)
        .map(|i| {
            let byte = bytes.get(i % bytes.len().max(1)).copied().unwrap_or(0);
            (byte as f32 + i as f32) / 255.0
        })
        .collect();

    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }
    vec
}
