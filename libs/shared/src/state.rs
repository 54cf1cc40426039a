//! Upload state vocabulary.
//!
//! Both processes link this one enum; the wire contract is the *name* of
//! each state, never its position.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// State of one OTA attempt, as reported over the status-line channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadState {
    /// Attempt accepted, worker process not yet compiling
    Starting,

    /// External build tool running
    Compiling,

    /// Wake intent published, waiting for the device to report READY
    Syncing,

    /// External upload tool running
    Uploading,

    /// New binary delivered
    Success,

    /// Stopped by the operator during the wake wait
    Cancelled,

    /// Broker connect, publish or subscribe failure
    MqttError,

    /// The device did not wake up before the deadline
    SyncingError,

    /// External build tool failed
    CompileError,

    /// External upload tool failed
    TransmitError,

    /// Any other fault
    Error,

    /// Worker finished; no further status lines follow
    End,

    /// No attempt has run yet
    #[default]
    None,
}

impl UploadState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Starting => "STARTING",
            UploadState::Compiling => "COMPILING",
            UploadState::Syncing => "SYNCING",
            UploadState::Uploading => "UPLOADING",
            UploadState::Success => "SUCCESS",
            UploadState::Cancelled => "CANCELLED",
            UploadState::MqttError => "MQTT_ERROR",
            UploadState::SyncingError => "SYNCING_ERROR",
            UploadState::CompileError => "COMPILE_ERROR",
            UploadState::TransmitError => "TRANSMIT_ERROR",
            UploadState::Error => "ERROR",
            UploadState::End => "END",
            UploadState::None => "NONE",
        }
    }

    /// Whether an attempt that reached this state is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Success
                | UploadState::Cancelled
                | UploadState::MqttError
                | UploadState::SyncingError
                | UploadState::CompileError
                | UploadState::TransmitError
                | UploadState::Error
                | UploadState::End
        )
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTING" => Ok(UploadState::Starting),
            "COMPILING" => Ok(UploadState::Compiling),
            "SYNCING" => Ok(UploadState::Syncing),
            "UPLOADING" => Ok(UploadState::Uploading),
            "SUCCESS" => Ok(UploadState::Success),
            "CANCELLED" => Ok(UploadState::Cancelled),
            "MQTT_ERROR" => Ok(UploadState::MqttError),
            "SYNCING_ERROR" => Ok(UploadState::SyncingError),
            "COMPILE_ERROR" => Ok(UploadState::CompileError),
            "TRANSMIT_ERROR" => Ok(UploadState::TransmitError),
            "ERROR" => Ok(UploadState::Error),
            "END" => Ok(UploadState::End),
            "NONE" => Ok(UploadState::None),
            _ => Err(format!("Unknown upload state: {}", s)),
        }
    }
}
