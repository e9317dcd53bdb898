use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use super::storage::persist_images;
use super::summary::summarize;
use super::validate::validate;
use super::{IngestError, IngestInput};
use crate::core_state::ModelSlot;
use crate::models::{Bundle, ContentType, NoteEmbedding};
use crate::pipeline::inference::EmbeddingModel;
use crate::pipeline::prescription::extract_records;

/// Characters of the note kept in the embedding preview.
pub const PREVIEW_CHARS: usize = 100;

/// First 100 characters, with `...` appended when the note is longer.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Build a [`Bundle`] from one ingest request.
///
/// Validation runs to completion before the embedder is called or any file
/// is written. An unavailable or failing embedder adds a warning instead of
/// failing the request. Blocking: run inside `spawn_blocking`.
pub fn assemble(
    input: IngestInput,
    embedder: &ModelSlot<Arc<dyn EmbeddingModel>>,
    storage_dir: &Path,
) -> Result<Bundle, IngestError> {
    let start = Instant::now();
    let validated = validate(input)?;

    let request_id = Uuid::new_v4();
    let created_at = Utc::now();

    let mut content_types = Vec::with_capacity(3);
    if validated.structured.is_some() {
        content_types.push(ContentType::StructuredData);
    }
    if validated.note.is_some() {
        content_types.push(ContentType::TextNote);
    }
    if !validated.images.is_empty() {
        content_types.push(ContentType::Images);
    }

    let mut warnings = Vec::new();
    let note = validated.note.as_deref();

    let records = note.map(extract_records).unwrap_or_default();
    let embedding = note.and_then(|text| embed_note(text, embedder, &mut warnings));
    let summary = summarize(validated.structured.as_ref(), note);
    let images = persist_images(storage_dir, &request_id, &validated.images)?;

    tracing::info!(
        %request_id,
        content_types = ?content_types,
        records = records.len(),
        images = images.len(),
        embedded = embedding.is_some(),
        elapsed_ms = %start.elapsed().as_millis(),
        "Bundle assembled"
    );

    Ok(Bundle {
        request_id,
        created_at,
        content_types,
        raw_text: validated.note,
        structured: validated.structured,
        records,
        images,
        embedding,
        summary,
        warnings,
    })
}

fn embed_note(
    text: &str,
    embedder: &ModelSlot<Arc<dyn EmbeddingModel>>,
    warnings: &mut Vec<String>,
) -> Option<NoteEmbedding> {
    let model = match embedder.get() {
        Ok(model) => model,
        Err(reason) => {
            warnings.push(format!("Embedding model unavailable: {reason}"));
            return None;
        }
    };
    match model.embed(text) {
        Ok(vector) => Some(NoteEmbedding {
            dimension: vector.len(),
            vector,
            preview: preview(text),
        }),
        Err(e) => {
            tracing::error!(error = %e, model = model.model_name(), "Note embedding failed");
            warnings.push(format!("Embedding failed: {e}"));
            None
        }
    }
}
