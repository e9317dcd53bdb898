use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "MedIntake";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix shared by every environment variable the service reads.
pub const ENV_PREFIX: &str = "MEDINTAKE_";

const DEFAULT_PORT: u16 = 8001;
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OCR_MODEL: &str = "llama3.2-vision";
const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_UPLOAD_MB: usize = 25;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Candidate labels for the zero-shot prescription classifier.
pub const DEFAULT_LABELS: &[&str] = &[
    "handwritten prescription",
    "printed prescription",
    "lab report",
    "not a prescription",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value}")]
    InvalidAddress { var: String, value: String },

    #[error("{var} must be a positive integer, got: {value}")]
    InvalidNumber { var: String, value: String },

    #[error("{var} must list at least two labels")]
    TooFewLabels { var: String },
}

/// Default tracing filter, overridden by `RUST_LOG`.
pub fn default_log_filter() -> &'static str {
    "info,medintake_lib=debug,tower_http=info"
}

/// Get the application data directory (~/MedIntake/)
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Get the models directory (for ONNX embeddings)
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Get the clinical embedding model directory
pub fn embedding_model_dir() -> PathBuf {
    models_dir().join("bio-clinical-bert")
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    /// Root of the per-request image directories served under `/storage`.
    pub storage_dir: PathBuf,
    pub ollama_url: String,
    pub ocr_model: String,
    pub embed_model: String,
    pub model_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
    pub labels: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            storage_dir: PathBuf::from("storage"),
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            ocr_model: DEFAULT_OCR_MODEL.into(),
            embed_model: DEFAULT_EMBED_MODEL.into(),
            model_timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            cors_origin: DEFAULT_CORS_ORIGIN.into(),
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(value) = get("BIND") {
            config.bind = value.parse().map_err(|_| ConfigError::InvalidAddress {
                var: format!("{ENV_PREFIX}BIND"),
                value: value.clone(),
            })?;
        }
        if let Some(value) = get("STORAGE_DIR") {
            config.storage_dir = PathBuf::from(value);
        }
        if let Some(value) = get("OLLAMA_URL") {
            config.ollama_url = value;
        }
        if let Some(value) = get("OCR_MODEL") {
            config.ocr_model = value;
        }
        if let Some(value) = get("EMBED_MODEL") {
            config.embed_model = value;
        }
        if let Some(value) = get("MODEL_TIMEOUT_SECS") {
            config.model_timeout_secs = parse_positive(&format!("{ENV_PREFIX}MODEL_TIMEOUT_SECS"), &value)?;
        }
        if let Some(value) = get("MAX_UPLOAD_MB") {
            let mb = parse_positive(&format!("{ENV_PREFIX}MAX_UPLOAD_MB"), &value)?;
            config.max_upload_bytes = mb as usize * 1024 * 1024;
        }
        if let Some(value) = get("CORS_ORIGIN") {
            config.cors_origin = value;
        }
        if let Some(value) = get("LABELS") {
            let labels: Vec<String> = value
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            if labels.len() < 2 {
                return Err(ConfigError::TooFewLabels {
                    var: format!("{ENV_PREFIX}LABELS"),
                });
            }
            config.labels = labels;
        }

        Ok(config)
    }
}

fn parse_positive(var: &str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("MedIntake"));
    }

    #[test]
    fn embedding_model_dir_under_models() {
        assert!(embedding_model_dir().starts_with(models_dir()));
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind.port(), 8001);
        assert_eq!(config.storage_dir, PathBuf::from("storage"));
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.labels.len(), DEFAULT_LABELS.len());
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("MEDINTAKE_BIND", "127.0.0.1:9000"),
            ("MEDINTAKE_STORAGE_DIR", "/tmp/uploads"),
            ("MEDINTAKE_MAX_UPLOAD_MB", "5"),
            ("MEDINTAKE_LABELS", "prescription, other"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.labels, vec!["prescription", "other"]);
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config =
            ServiceConfig::from_lookup(lookup_from(&[("MEDINTAKE_OLLAMA_URL", "   ")])).unwrap();
        assert_eq!(config.ollama_url, DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn invalid_bind_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("MEDINTAKE_BIND", "nowhere")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[(
            "MEDINTAKE_MODEL_TIMEOUT_SECS",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn single_label_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("MEDINTAKE_LABELS", "only")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::TooFewLabels { .. }));
    }
}
