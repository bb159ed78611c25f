//! Presence and notification interfaces for studyhalld
//!
//! This crate defines the boundary between the session core and the chat
//! gateway: who is in a channel, and where session notifications go. The
//! gateway-fed [`PresenceBoard`] and [`ChannelSink`] are the implementations
//! the daemon uses; the mocks back the tests.

mod board;
mod mock;
mod traits;

pub use board::*;
pub use mock::*;
pub use traits::*;
