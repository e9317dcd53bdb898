pub mod api;
pub mod config;
pub mod core_state;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("Cannot create storage directory {path}: {source}")]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Server(#[from] api::server::ServerError),
}

pub fn run() -> Result<(), RunError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("MedIntake starting v{}", config::APP_VERSION);

    let config = config::ServiceConfig::from_env()?;
    std::fs::create_dir_all(&config.storage_dir).map_err(|source| RunError::Storage {
        path: config.storage_dir.clone(),
        source,
    })?;

    // Blocking model clients own a runtime of their own; build them first.
    let models = core_state::load_models(&config);
    let core = Arc::new(core_state::CoreState::new(config, models));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RunError::Runtime)?;
    runtime.block_on(api::serve(core))?;
    Ok(())
}
