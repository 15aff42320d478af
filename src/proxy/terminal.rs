//! Interactive terminal streams: one browser socket bridged to one remote
//! PTY shell.

use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::{FutureExt, Sink, Stream};
use tokio_util::sync::CancellationToken;

use crate::config::Host;
use crate::error::ProtocolError;
use crate::protocol::{ConnectRequest, TerminalEvent, TerminalRequest};
use crate::security_log;
use crate::store::SessionRecord;
use crate::ssh::{PtySize, RemoteShell, ShellEvent, ShellReader, ShellWriter, build_auth};

use super::gate::resolve_host;
use super::outbound::Outbound;
use super::{Frame, ProxyContext, next_frame};

/// Lifecycle of a terminal stream once `connect` has been decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Authenticating,
    Connected,
    Streaming,
    Closing,
    Closed,
    Error,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Authenticating => "authenticating",
            Phase::Connected => "connected",
            Phase::Streaming => "streaming",
            Phase::Closing => "closing",
            Phase::Closed => "closed",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

struct Lifecycle {
    phase: Phase,
}

impl Lifecycle {
    fn advance(&mut self, next: Phase) {
        tracing::debug!(from = %self.phase, to = %next, "Terminal phase");
        self.phase = next;
    }
}

/// Why a terminal stream ended; sent as the `closed` reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    SessionEnded,
    ClientDisconnected,
    ClientGone,
    RemoteClosed,
    IdleTimeout,
    InternalError,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::SessionEnded => "session ended",
            CloseReason::ClientDisconnected => "client disconnected",
            CloseReason::ClientGone => "client connection lost",
            CloseReason::RemoteClosed => "remote shell exited",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::InternalError => "internal error",
        }
    }
}

/// Drive a terminal stream from a decoded `connect` to the final `closed`.
///
/// A session record exists only for streams that reached a running shell,
/// and is closed exactly once before `closed` is sent. A panic anywhere in
/// the stream still ends with `closed{"internal error"}`.
pub async fn run<S, R>(
    ctx: &ProxyContext,
    user_id: &str,
    client_addr: &str,
    mut request: ConnectRequest,
    outbound: Outbound<S>,
    inbound: R,
) where
    S: Sink<String> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<String, ProtocolError>> + Unpin + Send,
{
    let mut lifecycle = Lifecycle {
        phase: Phase::Connecting,
    };

    let established = AssertUnwindSafe(establish(
        ctx,
        user_id,
        client_addr,
        &mut request,
        &mut lifecycle,
    ))
    .catch_unwind()
    .await;
    drop(request);

    let (host, shell, record) = match established {
        Ok(Ok(established)) => established,
        Ok(Err(message)) => {
            lifecycle.advance(Phase::Error);
            outbound.send(&TerminalEvent::error(message)).await;
            finish(&outbound, &mut lifecycle, CloseReason::SessionEnded).await;
            return;
        }
        Err(_) => {
            tracing::error!(user_id = %user_id, "Terminal setup panicked");
            lifecycle.advance(Phase::Error);
            outbound
                .send(&TerminalEvent::error(CloseReason::InternalError.as_str()))
                .await;
            finish(&outbound, &mut lifecycle, CloseReason::InternalError).await;
            return;
        }
    };
    security_log::log_session_opened(record.id, user_id, host.id, client_addr);

    outbound
        .send(&TerminalEvent::Connected {
            session_id: record.id,
            host_name: host.name.clone(),
        })
        .await;

    lifecycle.advance(Phase::Streaming);
    let writer = shell.writer.clone();
    let reason = AssertUnwindSafe(stream(shell, &outbound, inbound, ctx.idle_timeout))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!(session_id = %record.id, "Terminal stream panicked");
            CloseReason::InternalError
        });

    lifecycle.advance(Phase::Closing);
    writer.close().await;
    if let Err(e) = ctx.store.close_session_record(record.id, Utc::now()).await {
        tracing::warn!(session_id = %record.id, "Failed to close session record: {}", e);
    }
    security_log::log_session_closed(record.id, reason.as_str());

    finish(&outbound, &mut lifecycle, reason).await;
}

async fn finish<S>(outbound: &Outbound<S>, lifecycle: &mut Lifecycle, reason: CloseReason)
where
    S: Sink<String> + Unpin + Send,
    S::Error: Display,
{
    lifecycle.advance(Phase::Closed);
    outbound
        .send(&TerminalEvent::Closed {
            reason: reason.as_str().to_string(),
        })
        .await;
}

/// Open the shell, then record the session. A shell whose record cannot be
/// written is closed again.
async fn establish(
    ctx: &ProxyContext,
    user_id: &str,
    client_addr: &str,
    request: &mut ConnectRequest,
    lifecycle: &mut Lifecycle,
) -> Result<(Host, RemoteShell, SessionRecord), String> {
    let (host, shell) = open(ctx, user_id, request, lifecycle).await?;

    match ctx
        .store
        .create_session_record(user_id, host.id, client_addr)
        .await
    {
        Ok(record) => Ok((host, shell, record)),
        Err(e) => {
            tracing::error!(host_id = %host.id, "Failed to create session record: {}", e);
            shell.writer.close().await;
            Err("failed to record session".to_string())
        }
    }
}

/// Resolve, build auth, dial and start the shell. The error is the text for
/// the client.
async fn open(
    ctx: &ProxyContext,
    user_id: &str,
    request: &mut ConnectRequest,
    lifecycle: &mut Lifecycle,
) -> Result<(Host, RemoteShell), String> {
    let host = resolve_host(ctx.store.as_ref(), &request.host_id, user_id)
        .await
        .map_err(str::to_string)?;
    let auth =
        build_auth(host.auth_kind, &mut request.credential).map_err(|e| e.client_message())?;

    lifecycle.advance(Phase::Authenticating);
    let size = PtySize::or_default(request.cols, request.rows);
    let shell = ctx
        .dialer
        .open_shell(&host, auth, size)
        .await
        .map_err(|e| {
            tracing::warn!(host_id = %host.id, "Terminal open failed: {}", e);
            e.client_message()
        })?;

    lifecycle.advance(Phase::Connected);
    Ok((host, shell))
}

/// Run both directions until one side ends. The remote→client pump is a
/// spawned task; client→remote runs here. Either side cancels the other.
async fn stream<S, R>(
    shell: RemoteShell,
    outbound: &Outbound<S>,
    mut inbound: R,
    idle_timeout: Option<Duration>,
) -> CloseReason
where
    S: Sink<String> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<String, ProtocolError>> + Unpin + Send,
{
    let RemoteShell { writer, reader } = shell;
    let cancel = CancellationToken::new();
    // Cancels the pump even if this future unwinds
    let _guard = cancel.clone().drop_guard();

    let pump = tokio::spawn(forward_output(reader, outbound.clone(), cancel.clone()));

    let client_reason = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break None,
            frame = next_frame(&mut inbound, idle_timeout) => frame,
        };

        match frame {
            Frame::Text(text) => match apply_request(&writer, &text).await {
                Applied::Continue => {}
                Applied::Disconnect => break Some(CloseReason::ClientDisconnected),
                Applied::ShellGone => break None,
            },
            Frame::Closed => break Some(CloseReason::ClientGone),
            Frame::Idle => break Some(CloseReason::IdleTimeout),
        }
    };

    cancel.cancel();
    let remote_reason = match pump.await {
        Ok(reason) => reason,
        Err(e) => {
            tracing::error!("Output pump failed: {}", e);
            Some(CloseReason::InternalError)
        }
    };

    client_reason
        .or(remote_reason)
        .unwrap_or(CloseReason::RemoteClosed)
}

enum Applied {
    Continue,
    Disconnect,
    /// The shell's command queue is gone
    ShellGone,
}

/// Apply one client frame to the shell. Unknown or malformed frames are
/// dropped.
async fn apply_request(writer: &ShellWriter, text: &str) -> Applied {
    let sent = match TerminalRequest::decode(text) {
        Ok(TerminalRequest::Input { data }) => writer.write(data.into_bytes()).await,
        Ok(TerminalRequest::Resize { cols, rows }) => {
            if cols == 0 || rows == 0 {
                tracing::debug!(cols, rows, "Ignoring empty resize");
                return Applied::Continue;
            }
            writer.resize(cols, rows).await
        }
        Ok(TerminalRequest::Disconnect) => return Applied::Disconnect,
        Err(e) => {
            tracing::debug!("Ignoring client frame: {}", e);
            return Applied::Continue;
        }
    };

    match sent {
        Ok(()) => Applied::Continue,
        Err(_) => Applied::ShellGone,
    }
}

/// Forward remote output to the client in arrival order. `None` means the
/// pump was cancelled from the client side.
async fn forward_output<S>(
    mut reader: ShellReader,
    outbound: Outbound<S>,
    cancel: CancellationToken,
) -> Option<CloseReason>
where
    S: Sink<String> + Unpin + Send,
    S::Error: Display,
{
    let mut decoder = Utf8Decoder::default();
    // Wakes the client loop even if this task panics
    let _guard = cancel.clone().drop_guard();

    let reason = loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return None,
            event = reader.next() => event,
        };

        match event {
            Some(ShellEvent::Output(bytes)) => {
                let data = decoder.decode(&bytes);
                if data.is_empty() {
                    continue;
                }
                if !outbound.send(&TerminalEvent::Output { data }).await {
                    break CloseReason::ClientGone;
                }
            }
            Some(ShellEvent::Eof) | None => {
                let data = decoder.finish();
                if !data.is_empty() {
                    outbound.send(&TerminalEvent::Output { data }).await;
                }
                break CloseReason::RemoteClosed;
            }
        }
    };

    Some(reason)
}

/// Turns a byte stream into text without splitting multi-byte characters
/// across chunk boundaries. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more
                            self.carry = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&tail).into_owned()
    }
}
