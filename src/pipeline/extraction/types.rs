use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Text recovered from one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPageResult {
    pub text: String,
    /// Heuristic 0.0-1.0; vision models do not report per-word scores.
    pub confidence: f32,
    pub model_used: String,
}

/// OCR engine abstraction (allows mocking for tests).
///
/// Input is the preprocessed PNG produced by
/// [`prepare_for_ocr`](super::preprocess::prepare_for_ocr).
pub trait OcrEngine: Send + Sync {
    fn ocr_image(&self, png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;

    fn model_name(&self) -> &str;
}
