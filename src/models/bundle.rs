use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ContentType;
use super::extraction::ExtractionRecord;

/// An uploaded image persisted under the request directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub filename: String,
    /// Retrievable path, `/storage/<request_id>/<filename>`.
    pub uri: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEmbedding {
    pub vector: Vec<f32>,
    pub dimension: usize,
    pub preview: String,
}

/// Everything extracted from one ingest request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub content_types: Vec<ContentType>,
    pub raw_text: Option<String>,
    pub structured: Option<serde_json::Value>,
    pub records: Vec<ExtractionRecord>,
    pub images: Vec<StoredImage>,
    pub embedding: Option<NoteEmbedding>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Bundle {
    pub fn has(&self, content_type: ContentType) -> bool {
        self.content_types.contains(&content_type)
    }
}
