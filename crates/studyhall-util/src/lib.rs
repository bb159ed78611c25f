//! Shared utilities for studyhall
//!
//! This crate provides:
//! - ID types (UserId, ChannelId, SessionId, ClientId)
//! - Calendar month identifiers used to key monthly statistics
//! - Time utilities (mock-able wall clock, monotonic session clock)
//! - Default paths for socket, data, and config files

mod ids;
mod month;
mod paths;
mod time;

pub use ids::*;
pub use month::*;
pub use paths::*;
pub use time::*;
