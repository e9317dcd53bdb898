//! Bundle Assembler: validates an ingest request, embeds and summarises the
//! note, extracts medicine records and stores uploaded images.

pub mod assembler;
pub mod storage;
pub mod summary;
pub mod validate;

pub use assembler::*;
pub use storage::{image_uri, sanitize_filename};
pub use summary::summarize;
pub use validate::{validate, AcceptedImage, ValidatedInput};

use thiserror::Error;

/// Raw multipart fields of one ingest request.
#[derive(Debug, Clone, Default)]
pub struct IngestInput {
    pub patient_note: Option<String>,
    pub patient_json_text: Option<String>,
    pub images: Vec<ImageUpload>,
}

/// One `images` file part as received.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("At least one of patient_note, patient_json_text, or images must be provided")]
    NothingProvided,

    #[error("patient_note cannot be empty")]
    EmptyNote,

    #[error("patient_json_text cannot be empty")]
    EmptyJson,

    #[error("Invalid JSON in patient_json_text: {0}")]
    InvalidJson(String),

    #[error("No valid images provided")]
    NoValidImages,

    #[error("Unsupported image format '{0}'. Only JPEG and PNG are supported")]
    UnsupportedImageType(String),

    #[error("Failed to store image: {0}")]
    Storage(#[source] std::io::Error),
}

impl IngestError {
    /// Caller mistakes, as opposed to server-side failures.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
