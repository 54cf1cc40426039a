//! Error types for the worker

use thiserror::Error;

/// Main error type for the worker
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Transmit error: {0}")]
    Transmit(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<otawake_shared::settings::SettingsError> for WorkerError {
    fn from(err: otawake_shared::settings::SettingsError) -> Self {
        WorkerError::Config(err.to_string())
    }
}
