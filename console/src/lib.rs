//! Console library for the otawake front end.
//!
//! The registry discovers deep-sleep devices from their YAML configuration,
//! the supervisor runs and watches one worker process per in-flight device,
//! and the command interpreter maps operator input onto the two.

pub mod commands;
pub mod device;
pub mod errors;
pub mod registry;
pub mod supervisor;
