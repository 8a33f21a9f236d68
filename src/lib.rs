//! hashbash: a checksum-verified TCP stress-test harness
//!
//! The server streams a requested number of pseudo-random bytes and checks
//! the client's checksum of them; the client drives many such sessions
//! concurrently and reduces their verdicts to a single pass/fail.
//!
//! - [`protocol`]: wire framing, checksum and verdict
//! - [`server`]: accept loop, session handler and random byte pool
//! - [`client`]: worker pool and per-connection cycles
//! - [`config`]: CLI and TOML configuration

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use error::{ClientError, ProtocolError};
