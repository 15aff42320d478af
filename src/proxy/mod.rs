//! Per-connection session engines, independent of the HTTP layer.
//!
//! A stream is any `Stream` of inbound text frames plus any `Sink` of
//! outbound text frames, so the engines run the same over a WebSocket or an
//! in-memory channel pair.

pub mod gate;
pub mod outbound;
pub mod terminal;
pub mod transfer;

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, Stream, StreamExt};
use zeroize::Zeroize;

use crate::error::ProtocolError;
use crate::protocol::{ConnectRequest, TerminalEvent, TransferEvent};
use crate::ssh::RemoteDialer;
use crate::store::SessionStore;

pub use outbound::Outbound;

/// Shared collaborators for every stream.
#[derive(Clone)]
pub struct ProxyContext {
    pub store: Arc<dyn SessionStore>,
    pub dialer: Arc<dyn RemoteDialer>,
    /// Close a stream after this long without client input
    pub idle_timeout: Option<Duration>,
}

/// Which engine a stream is bound to, fixed by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Terminal,
    Transfer,
}

impl Flavor {
    /// Error text for a first frame that is not a usable `connect`.
    pub fn connect_error(self, error: &ProtocolError) -> &'static str {
        match (self, error) {
            (Flavor::Terminal, ProtocolError::Malformed(_)) => "invalid message format",
            (Flavor::Terminal, ProtocolError::MissingConnectFields) => {
                "host_id and credential are required"
            }
            (_, ProtocolError::InvalidPayload { .. })
            | (Flavor::Transfer, ProtocolError::MissingConnectFields) => {
                "invalid connect payload"
            }
            _ => "expected connect message",
        }
    }

    async fn send_error<S>(self, outbound: &Outbound<S>, message: &str)
    where
        S: Sink<String> + Unpin + Send,
        S::Error: Display,
    {
        match self {
            Flavor::Terminal => outbound.send(&TerminalEvent::error(message)).await,
            Flavor::Transfer => outbound.send(&TransferEvent::error(message)).await,
        };
    }
}

/// Serve one upgraded stream: read the `connect` frame, then hand off to the
/// engine for `flavor`. Returns when the stream is finished; the caller
/// closes the transport.
pub async fn serve_stream<S, R>(
    flavor: Flavor,
    ctx: &ProxyContext,
    user_id: &str,
    client_addr: &str,
    outbound: Outbound<S>,
    mut inbound: R,
) where
    S: Sink<String> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<String, ProtocolError>> + Unpin + Send,
{
    let Some(request) = read_connect(flavor, &outbound, &mut inbound).await else {
        return;
    };

    tracing::debug!(flavor = ?flavor, client_addr = %client_addr, "Stream connecting");
    match flavor {
        Flavor::Terminal => {
            terminal::run(ctx, user_id, client_addr, request, outbound, inbound).await
        }
        Flavor::Transfer => transfer::run(ctx, user_id, request, outbound, inbound).await,
    }
}

/// Read and decode the first frame. On failure exactly one `error` is sent
/// and `None` returned. The raw frame text is zeroed either way, since it
/// carries the credential.
async fn read_connect<S, R>(
    flavor: Flavor,
    outbound: &Outbound<S>,
    inbound: &mut R,
) -> Option<ConnectRequest>
where
    S: Sink<String> + Unpin + Send,
    S::Error: Display,
    R: Stream<Item = Result<String, ProtocolError>> + Unpin + Send,
{
    let mut frame = match inbound.next().await {
        Some(Ok(text)) => text,
        Some(Err(e)) => {
            tracing::debug!("Stream failed before connect: {}", e);
            return None;
        }
        None => return None,
    };

    let decoded = ConnectRequest::decode(&frame);
    frame.zeroize();

    match decoded {
        Ok(request) => Some(request),
        Err(e) => {
            tracing::debug!(flavor = ?flavor, "Rejecting first frame: {}", e);
            flavor.send_error(outbound, flavor.connect_error(&e)).await;
            None
        }
    }
}

pub(crate) enum Frame {
    Text(String),
    /// End of stream or transport error
    Closed,
    /// No frame within the idle timeout
    Idle,
}

/// Next inbound text frame. Cancel safe.
pub(crate) async fn next_frame<R>(inbound: &mut R, idle_timeout: Option<Duration>) -> Frame
where
    R: Stream<Item = Result<String, ProtocolError>> + Unpin,
{
    let item = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, inbound.next()).await {
            Ok(item) => item,
            Err(_) => return Frame::Idle,
        },
        None => inbound.next().await,
    };

    match item {
        Some(Ok(text)) => Frame::Text(text),
        Some(Err(e)) => {
            tracing::debug!("Client read failed: {}", e);
            Frame::Closed
        }
        None => Frame::Closed,
    }
}
