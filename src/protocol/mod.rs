//! JSON message codec shared by both stream flavors.
//!
//! Every frame is one JSON object `{"type": <string>, "payload": <object>}`.
//! Inbound frames are decoded in two steps: the envelope is parsed with the
//! payload left as borrowed raw JSON, then the payload is decoded into the
//! type selected by `type`. This keeps three failure modes apart: a frame
//! that is not an envelope at all, an unknown `type`, and a payload that does
//! not fit its `type`.

pub mod terminal;
pub mod transfer;

use std::borrow::Cow;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::error::ProtocolError;
use crate::ssh::InFlightCredential;

pub use terminal::{TerminalEvent, TerminalRequest};
pub use transfer::{DoneOp, TransferEvent, TransferRequest};

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type", borrow)]
    kind: Cow<'a, str>,
    #[serde(borrow, default)]
    payload: Option<&'a RawValue>,
}

impl<'a> Envelope<'a> {
    fn parse(text: &'a str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let raw = self.payload.map(RawValue::get).unwrap_or("null");
        serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidPayload {
            kind: self.kind.to_string(),
            reason: e.to_string(),
        })
    }
}

/// First frame of every stream.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub credential: InFlightCredential,
    #[serde(default)]
    pub cols: u16,
    #[serde(default)]
    pub rows: u16,
}

impl ConnectRequest {
    /// Decode the opening frame. `host_id` and `credential` must be present
    /// and non-empty; `cols`/`rows` default to 0 ("unspecified").
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope = Envelope::parse(text)?;
        if envelope.kind != "connect" {
            return Err(ProtocolError::UnexpectedFirst(envelope.kind.into_owned()));
        }

        let request: ConnectRequest = envelope.payload()?;
        if request.host_id.trim().is_empty() || request.credential.is_empty() {
            return Err(ProtocolError::MissingConnectFields);
        }
        Ok(request)
    }
}
