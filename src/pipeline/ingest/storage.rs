//! Request-scoped image storage under `<storage_dir>/<request_id>/`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::validate::AcceptedImage;
use super::IngestError;
use crate::models::StoredImage;

const MAX_FILENAME_CHARS: usize = 100;
const FALLBACK_FILENAME: &str = "image";

/// Make an uploaded filename safe to join onto the request directory.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|&c| c != '/' && c != '\\' && c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Remove consecutive dots (path traversal prevention) and hidden-file dots
    let sanitized = sanitized.replace("..", "");
    let sanitized = sanitized.trim_start_matches('.');
    let sanitized: String = sanitized.chars().take(MAX_FILENAME_CHARS).collect();

    if sanitized.is_empty() {
        FALLBACK_FILENAME.into()
    } else {
        sanitized
    }
}

/// Suffix repeated names with `_1`, `_2`, ... before the extension.
pub fn dedupe_filenames(names: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            if taken.insert(name.clone()) {
                return name;
            }
            let (stem, ext) = match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
                _ => (name.clone(), String::new()),
            };
            let unique = (1..)
                .map(|n| format!("{stem}_{n}{ext}"))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_default();
            taken.insert(unique.clone());
            unique
        })
        .collect()
}

pub fn request_dir(storage_dir: &Path, request_id: &Uuid) -> PathBuf {
    storage_dir.join(request_id.to_string())
}

/// Public URI under which the static mount serves a stored image.
pub fn image_uri(request_id: &Uuid, filename: &str) -> String {
    format!("/storage/{request_id}/{filename}")
}

/// Write every image into the request directory. On any failure the
/// directory is removed so a failed request leaves nothing behind.
pub fn persist_images(
    storage_dir: &Path,
    request_id: &Uuid,
    images: &[AcceptedImage],
) -> Result<Vec<StoredImage>, IngestError> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    let dir = request_dir(storage_dir, request_id);

    match write_all(&dir, request_id, images) {
        Ok(stored) => {
            tracing::debug!(dir = %dir.display(), count = stored.len(), "Images stored");
            Ok(stored)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::warn!(dir = %dir.display(), error = %cleanup, "Cleanup after failed write");
            }
            Err(IngestError::Storage(e))
        }
    }
}

fn write_all(
    dir: &Path,
    request_id: &Uuid,
    images: &[AcceptedImage],
) -> Result<Vec<StoredImage>, std::io::Error> {
    fs::create_dir_all(dir)?;
    images
        .iter()
        .map(|image| {
            fs::write(dir.join(&image.filename), &image.bytes)?;
            Ok(StoredImage {
                filename: image.filename.clone(),
                uri: image_uri(request_id, &image.filename),
                mime_type: image.mime.as_str().to_string(),
                size_bytes: image.bytes.len() as u64,
            })
        })
        .collect()
}
