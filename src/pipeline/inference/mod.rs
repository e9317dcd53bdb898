//! Opaque model backends: text embedding and prescription classification.

pub mod classifier;
pub mod embedder;

pub use classifier::*;
pub use embedder::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::ollama::OllamaError;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Classification failed: {0}")]
    Classification(String),
}
