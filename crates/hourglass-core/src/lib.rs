//! Lifecycle core for hourglassd
//!
//! This crate decides when the game server instance runs:
//! - Schedule evaluation (is "now" inside an allowed hour?)
//! - Lifecycle state machine (Stopped -> Starting -> Running -> ShuttingDown -> Stopped)
//! - Idle detection and end-of-window warnings
//! - The supervisor task that serializes start/stop requests and drives ticks

mod clock;
mod controller;
mod events;
mod guard;
mod schedule;
mod supervisor;
mod timer;

pub use clock::*;
pub use controller::*;
pub use events::*;
pub use guard::*;
pub use schedule::*;
pub use supervisor::*;
pub use timer::*;
