//! Status-line codec, the sole worker-to-supervisor channel.
//!
//! A supervised worker writes one `[device,STATE]` line to stdout for every
//! state it enters. The parser is strict: a line that is not exactly one
//! bracketed pair with a valid device name and a known state name is a typed
//! error, so the reader can degrade a single device's view without ever
//! killing its loop.

use std::fmt;

use thiserror::Error;

use crate::state::UploadState;

/// One parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub device: String,
    pub state: UploadState,
}

/// Why a line could not be accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusLineError {
    #[error("not a status line: {0:?}")]
    Malformed(String),

    #[error("unknown state name: {0:?}")]
    UnknownState(String),
}

fn is_device_name(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

fn is_state_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_uppercase() || b == b'_')
}

impl StatusLine {
    pub fn new(device: impl Into<String>, state: UploadState) -> Self {
        Self {
            device: device.into(),
            state,
        }
    }

    /// Parse one line of worker output.
    pub fn parse(line: &str) -> Result<Self, StatusLineError> {
        let malformed = || StatusLineError::Malformed(line.to_string());

        let inner = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(malformed)?;
        let (device, state) = inner.split_once(',').ok_or_else(malformed)?;

        if !is_device_name(device) || !is_state_name(state) {
            return Err(malformed());
        }

        let state = state
            .parse::<UploadState>()
            .map_err(|_| StatusLineError::UnknownState(state.to_string()))?;

        Ok(Self::new(device, state))
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.device, self.state)
    }
}
