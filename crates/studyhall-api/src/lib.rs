//! Protocol types for studyhalld IPC
//!
//! This crate defines the stable API between studyhalld and the chat gateway:
//! - Commands (requests from the gateway)
//! - Responses and structured reports
//! - Events (service -> gateway notifications)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
