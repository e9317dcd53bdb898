//! Prescription readers.
//!
//! Both routes take one image in the `file` field, preprocess it and run
//! OCR. `/analyze` then runs the pattern-based field extractor;
//! `/analyze-prescription` runs the zero-shot classifier instead.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::models::{ExtractionRecord, PatientMeta};
use crate::pipeline::extraction::prepare_for_ocr;
use crate::pipeline::inference::Classification;
use crate::pipeline::prescription;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub filename: String,
    pub raw_text: String,
    pub patient_info: PatientMeta,
    pub medications: Vec<ExtractionRecord>,
    /// Number of medicines found; 0 when `medications` holds only the sentinel.
    pub extracted_fields: usize,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub success: bool,
    pub filename: String,
    pub raw_text: String,
    pub classification: Classification,
}

/// The single uploaded image.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Text read from the image, or a placeholder when OCR is not loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrText {
    Read(String),
    Unavailable(String),
}

impl OcrText {
    pub fn into_text(self) -> String {
        match self {
            OcrText::Read(text) => text,
            OcrText::Unavailable(reason) => format!("[OCR unavailable: {reason}]"),
        }
    }
}

pub async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::Validation("No file selected".into()));
        }
        let bytes = field.bytes().await?.to_vec();
        return Ok(UploadedFile { filename, bytes });
    }
    Err(ApiError::Validation("No file uploaded".into()))
}

/// Preprocess and OCR one image. Blocking.
pub fn read_image(core: &CoreState, bytes: &[u8]) -> Result<OcrText, ApiError> {
    let prepared = prepare_for_ocr(bytes)?;
    match core.models.ocr.get() {
        Ok(engine) => {
            let result = engine.ocr_image(&prepared.png_bytes)?;
            tracing::debug!(
                model = %result.model_used,
                confidence = result.confidence,
                chars = result.text.len(),
                "OCR complete"
            );
            Ok(OcrText::Read(result.text))
        }
        Err(reason) => {
            tracing::warn!(reason, "OCR requested while model unavailable");
            Ok(OcrText::Unavailable(reason.to_string()))
        }
    }
}

/// Classify OCR text. Never fails: an unavailable or failing classifier
/// yields [`Classification::unavailable`].
pub fn classify_text(core: &CoreState, text: &OcrText) -> Classification {
    let OcrText::Read(text) = text else {
        return Classification::unavailable();
    };
    match core.models.classifier.get() {
        Ok(classifier) => match classifier.classify(text) {
            Ok(classification) => classification,
            Err(e) => {
                tracing::error!(error = %e, "Classification failed");
                Classification::unavailable()
            }
        },
        Err(reason) => {
            tracing::warn!(reason, "Classification requested while model unavailable");
            Classification::unavailable()
        }
    }
}

async fn with_core<T, F>(core: Arc<CoreState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&CoreState) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(core.as_ref())).await?
}

fn log_rejection(err: &ApiError) {
    if matches!(err, ApiError::Validation(_)) {
        tracing::warn!(error = %err, "Prescription upload rejected");
    }
}

/// `POST /analyze`: OCR then pattern-based medicine extraction.
pub async fn analyze(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let start = Instant::now();
    let UploadedFile { filename, bytes } =
        read_file_field(multipart).await.inspect_err(log_rejection)?;

    let (raw_text, extraction) = with_core(ctx.core.clone(), move |core| {
        let raw_text = read_image(core, &bytes)?.into_text();
        let extraction = prescription::extract(&raw_text);
        Ok((raw_text, extraction))
    })
    .await
    .inspect_err(log_rejection)?;

    let extracted_fields = extraction.medicines().count();
    tracing::info!(
        %filename,
        medicines = extracted_fields,
        elapsed_ms = %start.elapsed().as_millis(),
        "Prescription analyzed"
    );

    Ok(Json(AnalyzeResponse {
        success: true,
        filename,
        raw_text,
        patient_info: extraction.meta,
        medications: extraction.records,
        extracted_fields,
    }))
}

/// `POST /analyze-prescription`: OCR then zero-shot classification.
pub async fn analyze_prescription(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let start = Instant::now();
    let UploadedFile { filename, bytes } =
        read_file_field(multipart).await.inspect_err(log_rejection)?;

    let (raw_text, classification) = with_core(ctx.core.clone(), move |core| {
        let text = read_image(core, &bytes)?;
        let classification = classify_text(core, &text);
        Ok((text.into_text(), classification))
    })
    .await
    .inspect_err(log_rejection)?;

    tracing::info!(
        %filename,
        label = %classification.label,
        confidence = classification.confidence,
        elapsed_ms = %start.elapsed().as_millis(),
        "Prescription classified"
    );

    Ok(Json(ClassifyResponse {
        success: true,
        filename,
        raw_text,
        classification,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::core_state::{ModelHandles, ModelSlot};
    use crate::pipeline::extraction::{FailingOcrEngine, MockOcrEngine};
    use crate::pipeline::inference::{MockClassifier, UNAVAILABLE_LABEL};

    fn png_bytes() -> Vec<u8> {
        let img = image::GrayImage::from_fn(48, 48, |x, y| image::Luma([((x * 7 + y * 13) % 256) as u8]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn core_with_ocr(text: &str) -> CoreState {
        let mut models = ModelHandles::unavailable("not loaded");
        models.ocr = ModelSlot::Ready(Arc::new(MockOcrEngine::new(text, 0.9)));
        CoreState::new(ServiceConfig::default(), models)
    }

    #[test]
    fn placeholder_names_the_reason() {
        let text = OcrText::Unavailable("connection refused".into());
        assert_eq!(text.into_text(), "[OCR unavailable: connection refused]");
    }

    #[test]
    fn read_image_uses_loaded_engine() {
        let core = core_with_ocr("Paracetamol 500mg 1-0-1");
        let text = read_image(&core, &png_bytes()).unwrap();
        assert_eq!(text, OcrText::Read("Paracetamol 500mg 1-0-1".into()));
    }

    #[test]
    fn read_image_without_engine_returns_placeholder() {
        let core = CoreState::new(ServiceConfig::default(), ModelHandles::unavailable("down"));
        let text = read_image(&core, &png_bytes()).unwrap();
        assert_eq!(text, OcrText::Unavailable("down".into()));
    }

    #[test]
    fn read_image_rejects_non_image_bytes() {
        let core = core_with_ocr("ignored");
        let err = read_image(&core, b"%PDF-1.4 not an image").unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref m) if m == "Invalid image format"));
    }

    #[test]
    fn read_image_surfaces_ocr_failure_as_internal() {
        let mut models = ModelHandles::unavailable("not loaded");
        models.ocr = ModelSlot::Ready(Arc::new(FailingOcrEngine {
            reason: "model crashed".into(),
        }));
        let core = CoreState::new(ServiceConfig::default(), models);
        let err = read_image(&core, &png_bytes()).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn classify_uses_loaded_classifier() {
        let mut core = core_with_ocr("Rx");
        core.models.classifier = ModelSlot::Ready(Arc::new(MockClassifier::new(
            "printed prescription",
            &["printed prescription", "lab report"],
        )));
        let result = classify_text(&core, &OcrText::Read("Rx".into()));
        assert_eq!(result.label, "printed prescription");
        assert_eq!(result.scores.len(), 2);
    }

    #[test]
    fn classify_without_classifier_is_unavailable() {
        let core = core_with_ocr("Rx");
        let result = classify_text(&core, &OcrText::Read("Rx".into()));
        assert_eq!(result.label, UNAVAILABLE_LABEL);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn classify_skips_placeholder_text() {
        let mut core = core_with_ocr("Rx");
        core.models.classifier =
            ModelSlot::Ready(Arc::new(MockClassifier::new("a", &["a", "b"])));
        let result = classify_text(&core, &OcrText::Unavailable("down".into()));
        assert_eq!(result.label, UNAVAILABLE_LABEL);
    }
}
