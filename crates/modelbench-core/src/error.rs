//! Error types for ModelBench Core

use crate::validate::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine code for the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::Timeout(_) => "TIMEOUT_ERROR",
            Error::Provider(_) => "PROVIDER_ERROR",
            Error::Config(_) => "CONFIGURATION_ERROR",
            Error::Persistence(_) => "PERSISTENCE_ERROR",
            Error::Serialization(_) => "EXECUTION_ERROR",
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn recoverable(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
