//! Error types for Tabula core.

use tabula_engine::engine::EngineError;
use thiserror::Error;

/// Errors that can occur while loading, saving or configuring a workbook
#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid workbook: {message}")]
    InvalidWorkbook { message: String },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl TabulaError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TabulaError::InvalidWorkbook {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TabulaError>;
