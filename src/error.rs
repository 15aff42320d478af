use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationError;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid host '{name}': {source}")]
    InvalidHost {
        name: String,
        source: ValidationError,
    },

    #[error("Duplicate host id: {0}")]
    DuplicateHost(uuid::Uuid),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// SSH-related errors
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection failed to {host}:{port}: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("PTY request rejected: {0}")]
    PtyRequest(String),

    #[error("Shell request rejected: {0}")]
    ShellRequest(String),

    #[error("Timeout connecting to {0}")]
    Timeout(String),

    #[error("Host key verification failed: {0}")]
    HostKeyVerification(String),

    #[error("russh error: {0}")]
    Russh(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Russh(err.to_string())
    }
}

impl SshError {
    /// Text sent to the browser when opening a terminal fails.
    pub fn client_message(&self) -> String {
        match self {
            SshError::InvalidPrivateKey => self.to_string(),
            SshError::Channel(reason) => format!("failed to create SSH session: {reason}"),
            SshError::PtyRequest(reason) => format!("failed to request PTY: {reason}"),
            SshError::ShellRequest(reason) => format!("failed to start shell: {reason}"),
            other => format!("connection failed: {other}"),
        }
    }
}

/// SFTP-related errors
#[derive(Error, Debug)]
pub enum SftpError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("failed to open SFTP subsystem: {0}")]
    Subsystem(String),

    #[error("{op}: {reason}")]
    Operation { op: &'static str, reason: String },

    #[error("{path}: file exceeds transfer limit of {limit} bytes")]
    TooLarge { path: String, limit: u64 },
}

impl From<SshError> for SftpError {
    fn from(err: SshError) -> Self {
        SftpError::ConnectionFailed(err.to_string())
    }
}

/// Session store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("session record {0} is already closed")]
    AlreadyClosed(uuid::Uuid),

    #[error("{0} already exists")]
    Conflict(uuid::Uuid),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Wire protocol decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid message format: {0}")]
    Malformed(String),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("expected connect message, got '{0}'")]
    UnexpectedFirst(String),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("host_id and credential are required")]
    MissingConnectFields,

    #[error("transport error: {0}")]
    Transport(String),
}
