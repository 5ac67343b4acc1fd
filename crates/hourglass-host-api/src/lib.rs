//! Collaborator interfaces for hourglassd
//!
//! This crate defines the narrow async traits between the lifecycle core and
//! the outside world (cloud API, ssh, game-server query, chat). It contains
//! no network code itself; production implementations live in
//! `hourglass-remote`, and the mocks here back the core's tests.

mod errors;
mod mock;
mod traits;

pub use errors::*;
pub use mock::*;
pub use traits::*;
