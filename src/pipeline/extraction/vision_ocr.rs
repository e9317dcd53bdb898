//! Vision OCR engine: transcribes prescription and report photos through a
//! vision model served by Ollama.

use std::sync::Arc;

use base64::Engine as _;

use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;
use crate::pipeline::ollama::VisionClient;

const SYSTEM_PROMPT: &str = "\
You are a medical document transcriber. Copy every piece of visible text from the \
image exactly as written, including handwriting, keeping one line of output per line \
of the document. Do not explain, summarise or correct anything.";

const USER_PROMPT: &str = "\
Transcribe all text in this image. Output plain text only, no Markdown. \
If there is no readable text, output nothing.";

/// Production OCR engine backed by an Ollama vision model.
pub struct OllamaVisionOcr {
    vision_client: Arc<dyn VisionClient>,
    model_name: String,
}

impl OllamaVisionOcr {
    pub fn new(vision_client: Arc<dyn VisionClient>, model_name: String) -> Self {
        Self {
            vision_client,
            model_name,
        }
    }
}

impl OcrEngine for OllamaVisionOcr {
    fn ocr_image(&self, png_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let _span = tracing::info_span!(
            "vision_ocr",
            model = %self.model_name,
            image_size = png_bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let images = vec![base64::engine::general_purpose::STANDARD.encode(png_bytes)];
        let raw = self
            .vision_client
            .chat_with_images(&self.model_name, USER_PROMPT, &images, Some(SYSTEM_PROMPT))
            .map_err(|e| ExtractionError::OcrProcessing(format!("Vision OCR failed: {e}")))?;

        let text = strip_code_fence(&raw);
        let confidence = compute_heuristic_confidence(&text);

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            confidence,
            "Vision OCR complete"
        );

        Ok(OcrPageResult {
            text,
            confidence,
            model_used: self.model_name.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Remove a surrounding ```...``` block some models add despite the prompt.
fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop an info string such as ```text
    let body = match inner.split_once('\n') {
        Some((first, rest)) if !first.trim().contains(' ') => rest,
        _ => inner,
    };
    body.trim().to_string()
}

/// Estimate transcription quality from the output alone.
///
/// Length sets the base (0.2 below 20 chars, 0.5 below 100, 0.7 above).
/// Dose-like tokens (`500mg`, `10 ml`) add 0.1. Capped at 0.9.
fn compute_heuristic_confidence(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let base: f32 = match text.len() {
        0..=19 => 0.2,
        20..=99 => 0.5,
        _ => 0.7,
    };
    let lower = text.to_lowercase();
    let has_dose = ["mg", "ml", "mcg"].iter().any(|unit| {
        lower.match_indices(unit).any(|(i, _)| {
            lower[..i]
                .trim_end()
                .chars()
                .last()
                .is_some_and(|c| c.is_ascii_digit())
        })
    });
    (base + if has_dose { 0.1 } else { 0.0 }).min(0.9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ollama::OllamaError;
    use std::sync::Mutex;

    struct RecordingVisionClient {
        reply: String,
        seen: Mutex<Vec<(String, usize, bool)>>,
    }

    impl VisionClient for RecordingVisionClient {
        fn chat_with_images(
            &self,
            model: &str,
            _user_prompt: &str,
            images: &[String],
            system: Option<&str>,
        ) -> Result<String, OllamaError> {
            self.seen
                .lock()
                .unwrap()
                .push((model.to_string(), images.len(), system.is_some()));
            Ok(self.reply.clone())
        }
    }

    struct FailingVisionClient;

    impl VisionClient for FailingVisionClient {
        fn chat_with_images(
            &self,
            _model: &str,
            _user_prompt: &str,
            _images: &[String],
            _system: Option<&str>,
        ) -> Result<String, OllamaError> {
            Err(OllamaError::NotReachable("http://localhost:11434".into()))
        }
    }

    #[test]
    fn sends_one_image_with_system_prompt() {
        let client = Arc::new(RecordingVisionClient {
            reply: "Paracetamol 500mg 1-0-1".into(),
            seen: Mutex::new(Vec::new()),
        });
        let ocr = OllamaVisionOcr::new(client.clone(), "llava:13b".into());
        let result = ocr.ocr_image(b"png-bytes").unwrap();

        assert_eq!(result.text, "Paracetamol 500mg 1-0-1");
        assert_eq!(result.model_used, "llava:13b");
        let seen = client.seen.lock().unwrap();
        assert_eq!(*seen, vec![("llava:13b".to_string(), 1, true)]);
    }

    #[test]
    fn client_error_maps_to_extraction_error() {
        let ocr = OllamaVisionOcr::new(Arc::new(FailingVisionClient), "llava".into());
        let err = ocr.ocr_image(b"png").unwrap_err().to_string();
        assert!(err.contains("Vision OCR failed"), "Error: {err}");
    }

    #[test]
    fn code_fence_is_stripped() {
        assert_eq!(strip_code_fence("```text\nAmoxicillin 250mg\n```"), "Amoxicillin 250mg");
        assert_eq!(strip_code_fence("```\nline one\nline two```"), "line one\nline two");
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }

    #[test]
    fn confidence_empty_text_is_zero() {
        assert_eq!(compute_heuristic_confidence(""), 0.0);
    }

    #[test]
    fn confidence_rises_with_length_and_doses() {
        let short = compute_heuristic_confidence("Rx");
        let long = compute_heuristic_confidence(&"Take rest and drink fluids. ".repeat(5));
        let with_dose = compute_heuristic_confidence(&"Paracetamol 500 mg twice daily. ".repeat(5));
        assert!(short < long);
        assert!(long < with_dose);
        assert!(with_dose <= 0.9);
    }
}
