//! Core session engine for studyhalld
//!
//! This crate contains:
//! - The session registry (one session per channel)
//! - The session state machine (Starting -> Studying -> Settling -> OnBreak -> Completed)
//! - Credit accounting for late joiners and leavers
//! - Monthly aggregation into organization and individual leaderboards

mod aggregate;
pub mod credit;
mod error;
mod registry;
mod service;
mod session;

pub use aggregate::*;
pub use error::*;
pub use registry::*;
pub use service::*;
pub use session::*;
