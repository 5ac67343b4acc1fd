//! Protocol types for hourglassd IPC
//!
//! This crate defines the stable API between hourglassd and clients:
//! - Commands (requests from clients)
//! - Responses
//! - Events (daemon -> clients)
//! - Lifecycle state and reason codes

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
