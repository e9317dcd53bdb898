//! Input validation for `/ingest`. Everything is checked here, before any
//! model call or file write.

use serde_json::Value;

use super::storage::{dedupe_filenames, sanitize_filename};
use super::{ImageUpload, IngestError, IngestInput};
use crate::models::ImageMime;

/// An image that passed validation, with its final on-disk filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedImage {
    pub filename: String,
    pub mime: ImageMime,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub note: Option<String>,
    pub structured: Option<Value>,
    pub images: Vec<AcceptedImage>,
}

/// An empty form value counts as not sent.
fn provided(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub fn validate(input: IngestInput) -> Result<ValidatedInput, IngestError> {
    let note = provided(input.patient_note.as_deref());
    let json_text = provided(input.patient_json_text.as_deref());

    if note.is_none() && json_text.is_none() && input.images.is_empty() {
        return Err(IngestError::NothingProvided);
    }

    if note.is_some_and(|n| n.trim().is_empty()) {
        return Err(IngestError::EmptyNote);
    }

    let structured = json_text.map(parse_structured).transpose()?;
    let images = validate_images(input.images)?;

    Ok(ValidatedInput {
        note: note.map(str::to_string),
        structured,
        images,
    })
}

fn parse_structured(text: &str) -> Result<Value, IngestError> {
    if text.trim().is_empty() {
        return Err(IngestError::EmptyJson);
    }
    serde_json::from_str(text).map_err(|e| IngestError::InvalidJson(e.to_string()))
}

/// Parts with no filename are empty form slots and are skipped. If image
/// parts were sent but none had a filename, the request is rejected.
fn validate_images(uploads: Vec<ImageUpload>) -> Result<Vec<AcceptedImage>, IngestError> {
    if uploads.is_empty() {
        return Ok(Vec::new());
    }
    let named: Vec<ImageUpload> = uploads
        .into_iter()
        .filter(|u| !u.filename.trim().is_empty())
        .collect();
    if named.is_empty() {
        return Err(IngestError::NoValidImages);
    }

    let mut mimes = Vec::with_capacity(named.len());
    for upload in &named {
        let declared = upload.content_type.as_deref().unwrap_or_default();
        let mime = ImageMime::from_declared(declared)
            .ok_or_else(|| IngestError::UnsupportedImageType(declared.to_string()))?;
        mimes.push(mime);
    }

    let filenames = dedupe_filenames(named.iter().map(|u| sanitize_filename(&u.filename)).collect());

    Ok(named
        .into_iter()
        .zip(mimes)
        .zip(filenames)
        .map(|((upload, mime), filename)| AcceptedImage {
            filename,
            mime,
            bytes: upload.bytes,
        })
        .collect())
}
