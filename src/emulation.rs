//! Protocol emulators.
//!
//! - `ftp`: line-oriented FTP control channel driven by a per-session state machine.
//! - `ssh`: russh-based server that rejects every login and fakes a shell.
//! - `http`: warp catch-all serving canned pages behind a shared rate limiter.
//!
//! `command_table` and `rate_limiter` hold the pieces shared between them.

pub mod command_table;
pub mod ftp;
pub mod http;
pub mod rate_limiter;
pub mod ssh;

pub use command_table::CommandTable;
pub use ftp::FtpEmulator;
pub use http::HttpEmulator;
pub use rate_limiter::RateLimiter;
pub use ssh::SshEmulator;
