//! `POST /ingest`: clinical note, structured JSON and images in, Bundle out.

use axum::extract::{Multipart, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::Bundle;
use crate::pipeline::ingest::{assemble, ImageUpload, IngestInput};

/// Collect the multipart form into an [`IngestInput`]. Unknown fields are
/// ignored; `images` may repeat.
pub async fn read_form(mut multipart: Multipart) -> Result<IngestInput, ApiError> {
    let mut input = IngestInput::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("patient_note") => input.patient_note = Some(field.text().await?),
            Some("patient_json_text") => input.patient_json_text = Some(field.text().await?),
            Some("images") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                input.images.push(ImageUpload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            other => tracing::debug!(field = ?other, "Ignoring unknown form field"),
        }
    }

    Ok(input)
}

pub async fn ingest(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<Bundle>, ApiError> {
    let input = read_form(multipart).await?;

    let core = ctx.core.clone();
    let result = tokio::task::spawn_blocking(move || {
        assemble(input, &core.models.embedder, &core.config.storage_dir)
    })
    .await?;

    match result {
        Ok(bundle) => Ok(Json(bundle)),
        Err(e) => {
            if e.is_validation() {
                tracing::warn!(error = %e, "Ingest request rejected");
            }
            Err(e.into())
        }
    }
}
