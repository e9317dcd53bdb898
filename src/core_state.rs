//! Process-wide state shared read-only by every request handler.
//!
//! Models are loaded once by [`load_models`] before the server starts. A
//! model that fails to load is recorded as unavailable with its reason;
//! handlers degrade instead of failing, and `/health` reports the status.

use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{self, ServiceConfig};
use crate::pipeline::extraction::{OcrEngine, OllamaVisionOcr};
use crate::pipeline::inference::{
    EmbeddingModel, OllamaEmbedder, PrescriptionClassifier, ZeroShotClassifier,
};
use crate::pipeline::ollama::OllamaClient;

// ═══════════════════════════════════════════════════════════
// Model slots
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ModelStatus {
    Ready,
    Unavailable(String),
}

/// A loaded backend, or the reason it could not be loaded.
pub enum ModelSlot<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> ModelSlot<T> {
    /// Record a load attempt, logging the outcome under `name`.
    pub fn from_load<E: Display>(name: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(model) => {
                tracing::info!(model = name, "Model ready");
                Self::Ready(model)
            }
            Err(e) => {
                tracing::error!(model = name, error = %e, "Model unavailable");
                Self::Unavailable(e.to_string())
            }
        }
    }

    pub fn get(&self) -> Result<&T, &str> {
        match self {
            Self::Ready(model) => Ok(model),
            Self::Unavailable(reason) => Err(reason),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn status(&self) -> ModelStatus {
        match self {
            Self::Ready(_) => ModelStatus::Ready,
            Self::Unavailable(reason) => ModelStatus::Unavailable(reason.clone()),
        }
    }
}

pub struct ModelHandles {
    pub ocr: ModelSlot<Arc<dyn OcrEngine>>,
    pub embedder: ModelSlot<Arc<dyn EmbeddingModel>>,
    pub classifier: ModelSlot<Arc<dyn PrescriptionClassifier>>,
}

impl ModelHandles {
    /// Every slot unavailable for the same reason.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            ocr: ModelSlot::Unavailable(reason.to_string()),
            embedder: ModelSlot::Unavailable(reason.to_string()),
            classifier: ModelSlot::Unavailable(reason.to_string()),
        }
    }

    pub fn all_ready(&self) -> bool {
        self.ocr.is_ready() && self.embedder.is_ready() && self.classifier.is_ready()
    }
}

/// Load every model backend. Blocking: call before the async runtime starts.
pub fn load_models(config: &ServiceConfig) -> ModelHandles {
    let client = match OllamaClient::new(&config.ollama_url, config.model_timeout_secs) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "Model client could not be created");
            return ModelHandles::unavailable(&e.to_string());
        }
    };

    let ocr = ModelSlot::from_load(
        &config.ocr_model,
        client.require_model(&config.ocr_model).map(|()| {
            Arc::new(OllamaVisionOcr::new(client.clone(), config.ocr_model.clone()))
                as Arc<dyn OcrEngine>
        }),
    );

    let embedder = ModelSlot::from_load("embedder", load_embedder(config, client));

    let classifier = match embedder.get() {
        Ok(embedder) => ModelSlot::from_load(
            "zero-shot classifier",
            ZeroShotClassifier::new(embedder.clone(), config.labels.clone())
                .map(|c| Arc::new(c) as Arc<dyn PrescriptionClassifier>),
        ),
        Err(reason) => ModelSlot::Unavailable(format!("embedding model unavailable: {reason}")),
    };

    ModelHandles {
        ocr,
        embedder,
        classifier,
    }
}

/// Local ONNX clinical BERT when compiled in and present, else Ollama.
fn load_embedder(
    config: &ServiceConfig,
    client: Arc<OllamaClient>,
) -> Result<Arc<dyn EmbeddingModel>, crate::pipeline::inference::ModelError> {
    #[cfg(feature = "onnx-embeddings")]
    {
        match crate::pipeline::inference::OnnxEmbedder::load(&config::embedding_model_dir()) {
            Ok(onnx) => return Ok(Arc::new(onnx)),
            Err(e) => tracing::warn!(error = %e, "ONNX embedder not loaded, using Ollama"),
        }
    }
    tracing::debug!(dir = %config::embedding_model_dir().display(), "Embedding via Ollama");
    OllamaEmbedder::connect(client, &config.embed_model)
        .map(|e| Arc::new(e) as Arc<dyn EmbeddingModel>)
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

/// Immutable after startup; wrapped in `Arc` and handed to the router.
pub struct CoreState {
    pub config: ServiceConfig,
    pub models: ModelHandles,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsHealth {
    pub ocr: ModelStatus,
    pub embedder: ModelStatus,
    pub classifier: ModelStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub models: ModelsHealth,
}

impl CoreState {
    pub fn new(config: ServiceConfig, models: ModelHandles) -> Self {
        Self { config, models }
    }

    /// `"healthy"` when every model is ready, `"degraded"` otherwise.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: if self.models.all_ready() {
                "healthy"
            } else {
                "degraded"
            },
            service: config::APP_NAME,
            version: config::APP_VERSION,
            models: ModelsHealth {
                ocr: self.models.ocr.status(),
                embedder: self.models.embedder.status(),
                classifier: self.models.classifier.status(),
            },
        }
    }
}
