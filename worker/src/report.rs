//! Attempt progress reporting.
//!
//! Under supervision every state the engine enters becomes one status line
//! on stdout; stdout carries nothing else. Human-readable progress goes
//! through `tracing` to stderr in both modes.

use std::io::Write;

use tracing::debug;

use otawake_shared::state::UploadState;
use otawake_shared::status::StatusLine;

/// Emits the machine status-line protocol when running under supervision.
#[derive(Debug, Clone)]
pub struct Reporter {
    device: String,
    supervised: bool,
}

impl Reporter {
    pub fn new(device: impl Into<String>, supervised: bool) -> Self {
        Self {
            device: device.into(),
            supervised,
        }
    }

    /// Report that the attempt entered `state`.
    pub fn enter(&self, state: UploadState) {
        debug!("[{}] entering {}", self.device, state);
        if self.supervised {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", StatusLine::new(self.device.as_str(), state));
            let _ = stdout.flush();
        }
    }
}
