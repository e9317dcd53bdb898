use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;

/// Mock OCR engine for unit testing without a vision model.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
            model_used: self.model_name().to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "mock-ocr"
    }
}

/// OCR engine that always fails, for exercising error paths.
pub struct FailingOcrEngine {
    pub reason: String,
}

impl OcrEngine for FailingOcrEngine {
    fn ocr_image(&self, _png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrProcessing(self.reason.clone()))
    }

    fn model_name(&self) -> &str {
        "failing-ocr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_configured_text() {
        let engine = MockOcrEngine::new("Paracetamol 500mg", 0.9);
        let result = engine.ocr_image(b"png").unwrap();
        assert_eq!(result.text, "Paracetamol 500mg");
        assert_eq!(result.model_used, "mock-ocr");
    }

    #[test]
    fn failing_engine_reports_reason() {
        let engine = FailingOcrEngine {
            reason: "model crashed".into(),
        };
        let err = engine.ocr_image(b"png").unwrap_err();
        assert!(err.to_string().contains("model crashed"));
    }
}
