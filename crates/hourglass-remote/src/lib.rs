//! Production collaborators for hourglassd
//!
//! Implements the traits from `hourglass-host-api` against real systems:
//! - `ssh` client processes for remote commands
//! - Minecraft Java Server List Ping for player counts
//! - DigitalOcean droplet actions for power control
//! - Discord bot messages, generic webhooks, or the log for notifications

mod digitalocean;
mod notify;
mod slp;
mod ssh;

#[cfg(test)]
mod test_http;

pub use digitalocean::*;
pub use notify::*;
pub use slp::*;
pub use ssh::*;
