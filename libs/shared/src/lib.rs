//! Shared vocabulary for the otawake OTA tools.
//!
//! The worker and the console run as separate processes but speak one
//! protocol: the upload state set, the status-line codec, the wake-handshake
//! topic layout and the settings surface all live here so the two sides can
//! never drift apart.

pub mod logs;
pub mod settings;
pub mod state;
pub mod status;
pub mod topics;
