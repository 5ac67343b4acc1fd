//! Shared utilities for hourglass
//!
//! This crate provides:
//! - The weekly allowed-hours model (`HourSet`, `WeeklySchedule`)
//! - Clock access with a debug-only mock offset
//! - ID types (ClientId)
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket and config

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
