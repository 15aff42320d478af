//! Security event logging for audit trails.
//!
//! Every event is emitted with `target: "security"` and an `event` field so
//! the audit stream can be filtered out of the general log:
//! ```bash
//! RUST_LOG=security=info shellgate
//! ```
//!
//! Credentials never appear here; the SSH events carry the method name only.

use tracing::{info, warn};
use uuid::Uuid;

/// Log an SSH authentication attempt.
pub fn log_auth_attempt(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

/// Log a successful SSH authentication.
pub fn log_auth_success(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

/// Log a failed SSH authentication attempt.
pub fn log_auth_failure(host: &str, port: u16, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log an upgrade refused because the `Origin` header is not allowed.
pub fn log_origin_rejected(origin: Option<&str>, path: &str) {
    warn!(
        target: "security",
        event = "origin_rejected",
        origin = origin.unwrap_or("<none>"),
        path = %path,
        "WebSocket upgrade refused: origin not allowed"
    );
}

/// Log a request refused because no caller identity was established.
pub fn log_caller_rejected(path: &str) {
    warn!(
        target: "security",
        event = "caller_rejected",
        path = %path,
        "Request refused: unauthenticated"
    );
}

/// Log a terminal session record being opened.
pub fn log_session_opened(session_id: Uuid, user_id: &str, host_id: Uuid, client_addr: &str) {
    info!(
        target: "security",
        event = "session_opened",
        session_id = %session_id,
        user_id = %user_id,
        host_id = %host_id,
        client_addr = %client_addr,
        "Terminal session opened"
    );
}

/// Log a terminal session record being closed.
pub fn log_session_closed(session_id: Uuid, reason: &str) {
    info!(
        target: "security",
        event = "session_closed",
        session_id = %session_id,
        reason = %reason,
        "Terminal session closed"
    );
}

/// Log a change to a saved host. `action` is `created`, `updated` or
/// `deleted`.
pub fn log_host_changed(user_id: &str, host_id: Uuid, action: &str) {
    info!(
        target: "security",
        event = "host_changed",
        user_id = %user_id,
        host_id = %host_id,
        action = %action,
        "Saved host changed"
    );
}

/// Log an SFTP connection establishment.
pub fn log_sftp_connect(host: &str, port: u16, username: &str) {
    info!(
        target: "security",
        event = "sftp_connect",
        host = %host,
        port = port,
        username = %username,
        "SFTP connection established"
    );
}

/// Log a one-time code that was valid but already used.
pub fn log_otp_replay_rejected() {
    warn!(
        target: "security",
        event = "otp_replay_rejected",
        "One-time code rejected: already used"
    );
}
