use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

use super::Envelope;

/// Browser → proxy messages after `connect` on a terminal stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalRequest {
    /// Keystrokes, forwarded verbatim
    Input { data: String },
    Resize { cols: u16, rows: u16 },
    Disconnect,
}

#[derive(Deserialize)]
struct InputPayload {
    data: String,
}

#[derive(Deserialize)]
struct ResizePayload {
    cols: u16,
    rows: u16,
}

impl TerminalRequest {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope = Envelope::parse(text)?;
        match envelope.kind.as_ref() {
            "input" => {
                let InputPayload { data } = envelope.payload()?;
                Ok(TerminalRequest::Input { data })
            }
            "resize" => {
                let ResizePayload { cols, rows } = envelope.payload()?;
                Ok(TerminalRequest::Resize { cols, rows })
            }
            "disconnect" => Ok(TerminalRequest::Disconnect),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Proxy → browser messages on a terminal stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TerminalEvent {
    Connected { session_id: Uuid, host_name: String },
    Output { data: String },
    Error { message: String },
    Closed { reason: String },
}

impl TerminalEvent {
    pub fn error(message: impl Into<String>) -> Self {
        TerminalEvent::Error {
            message: message.into(),
        }
    }
}
