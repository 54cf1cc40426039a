//! Error types for the console

use thiserror::Error;

/// Main error type for the console
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device {0} does not exist")]
    UnknownDevice(String),

    #[error("An upload task is already running for {0}")]
    TaskActive(String),

    #[error("No upload task is running for {0}")]
    NoTask(String),

    #[error("The upload task for {0} cannot be stopped now")]
    NotStoppable(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<otawake_shared::settings::SettingsError> for ConsoleError {
    fn from(err: otawake_shared::settings::SettingsError) -> Self {
        ConsoleError::Config(err.to_string())
    }
}
