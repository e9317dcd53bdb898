//! Zero-shot prescription classification over text embeddings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::embedder::EmbeddingModel;
use super::ModelError;

/// Label reported when no classifier could be loaded.
pub const UNAVAILABLE_LABEL: &str = "unavailable";

/// Multiplier applied to cosine similarities before softmax. Cosines sit in
/// a narrow band, so unscaled softmax would be close to uniform.
const LOGIT_SCALE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Winning label plus the full distribution, highest score first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
    pub scores: Vec<LabelScore>,
}

impl Classification {
    pub fn unavailable() -> Self {
        Self {
            label: UNAVAILABLE_LABEL.to_string(),
            confidence: 0.0,
            scores: Vec::new(),
        }
    }
}

pub trait PrescriptionClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Classification, ModelError>;

    fn labels(&self) -> &[String];
}

/// Hypothesis sentence embedded once per candidate label.
pub fn hypothesis(label: &str) -> String {
    format!("This document is a {label}.")
}

/// Scores each label by cosine similarity between the text embedding and
/// the label's hypothesis embedding, normalised with softmax.
pub struct ZeroShotClassifier {
    embedder: Arc<dyn EmbeddingModel>,
    labels: Vec<String>,
    hypotheses: Vec<Vec<f32>>,
}

impl ZeroShotClassifier {
    pub fn new(embedder: Arc<dyn EmbeddingModel>, labels: Vec<String>) -> Result<Self, ModelError> {
        if labels.len() < 2 {
            return Err(ModelError::Classification(
                "at least two candidate labels are required".into(),
            ));
        }
        let sentences: Vec<String> = labels.iter().map(|l| hypothesis(l)).collect();
        let refs: Vec<&str> = sentences.iter().map(String::as_str).collect();
        let hypotheses = embedder.embed_batch(&refs)?;

        tracing::info!(
            labels = labels.len(),
            embedder = embedder.model_name(),
            "Zero-shot classifier ready"
        );
        Ok(Self {
            embedder,
            labels,
            hypotheses,
        })
    }
}

impl PrescriptionClassifier for ZeroShotClassifier {
    fn classify(&self, text: &str) -> Result<Classification, ModelError> {
        let vector = self.embedder.embed(text)?;
        let logits: Vec<f32> = self
            .hypotheses
            .iter()
            .map(|h| cosine_similarity(&vector, h) * LOGIT_SCALE)
            .collect();
        let probabilities = softmax(&logits);

        let mut scores: Vec<LabelScore> = self
            .labels
            .iter()
            .zip(probabilities)
            .map(|(label, score)| LabelScore {
                label: label.clone(),
                score,
            })
            .collect();
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));

        let top = scores
            .first()
            .ok_or_else(|| ModelError::Classification("no labels scored".into()))?;
        Ok(Classification {
            label: top.label.clone(),
            confidence: top.score,
            scores,
        })
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Always returns the configured label with confidence 1.0.
pub struct MockClassifier {
    labels: Vec<String>,
    label: String,
}

impl MockClassifier {
    pub fn new(label: &str, labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            label: label.to_string(),
        }
    }
}

impl PrescriptionClassifier for MockClassifier {
    fn classify(&self, _text: &str) -> Result<Classification, ModelError> {
        let scores = self
            .labels
            .iter()
            .map(|l| LabelScore {
                label: l.clone(),
                score: if *l == self.label { 1.0 } else { 0.0 },
            })
            .collect();
        Ok(Classification {
            label: self.label.clone(),
            confidence: 1.0,
            scores,
        })
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::inference::MockEmbedder;

    /// One axis per keyword, checked in order.
    struct KeywordEmbedder;

    impl EmbeddingModel for KeywordEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
            let lower = text.to_lowercase();
            Ok(if lower.contains("handwritten") {
                vec![1.0, 0.0, 0.0]
            } else if lower.contains("lab") {
                vec![0.0, 1.0, 0.0]
            } else {
                vec![0.0, 0.0, 1.0]
            })
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    fn labels() -> Vec<String> {
        vec!["handwritten prescription".into(), "lab report".into(), "other".into()]
    }

    #[test]
    fn closest_hypothesis_wins() {
        let classifier = ZeroShotClassifier::new(Arc::new(KeywordEmbedder), labels()).unwrap();
        let result = classifier.classify("CBC LAB values: WBC 7.2").unwrap();
        assert_eq!(result.label, "lab report");
        assert_eq!(result.scores[0].label, "lab report");
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn scores_form_a_sorted_distribution() {
        let classifier =
            ZeroShotClassifier::new(Arc::new(MockEmbedder::with_dimension(64)), labels()).unwrap();
        let result = classifier.classify("Paracetamol 500mg 1-0-1").unwrap();

        assert_eq!(result.scores.len(), 3);
        let total: f32 = result.scores.iter().map(|s| s.score).sum();
        assert!((total - 1.0).abs() < 1e-4, "total = {total}");
        assert!(result.scores.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(result.label, result.scores[0].label);
        assert_eq!(result.confidence, result.scores[0].score);
    }

    #[test]
    fn single_label_is_rejected() {
        let result = ZeroShotClassifier::new(Arc::new(KeywordEmbedder), vec!["only".into()]);
        assert!(matches!(result, Err(ModelError::Classification(_))));
    }

    #[test]
    fn hypothesis_template() {
        assert_eq!(hypothesis("lab report"), "This document is a lab report.");
    }

    #[test]
    fn unavailable_has_zero_confidence() {
        let c = Classification::unavailable();
        assert_eq!(c.label, UNAVAILABLE_LABEL);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn mock_classifier_reports_configured_label() {
        let mock = MockClassifier::new("printed prescription", &["printed prescription", "other"]);
        let c = mock.classify("anything").unwrap();
        assert_eq!(c.label, "printed prescription");
        assert_eq!(mock.labels().len(), 2);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!(softmax(&[]).is_empty());
    }
}
