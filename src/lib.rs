//! shellgate: a browser-facing proxy for SSH terminal and SFTP sessions.
//!
//! The binary wires these modules together; integration tests drive the
//! engines through in-memory streams and fake remotes.

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod otp;
pub mod protocol;
pub mod proxy;
pub mod security_log;
pub mod sftp;
pub mod ssh;
pub mod store;
pub mod validation;
