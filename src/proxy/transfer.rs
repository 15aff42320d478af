//! File-transfer streams: request/response over one SFTP session.

use std::fmt::Display;

use data_encoding::BASE64;
use futures::{Sink, Stream};

use crate::error::ProtocolError;
use crate::protocol::{ConnectRequest, DoneOp, TransferEvent, TransferRequest};
use crate::sftp::RemoteFs;
use crate::sftp::types::{base_name, sort_entries};
use crate::ssh::build_auth;

use super::gate::resolve_host;
use super::outbound::Outbound;
use super::{Frame, ProxyContext, next_frame};

/// Serve a file-transfer stream from a decoded `connect` until the client
/// goes away. Requests are handled one at a time; a failed request gets an
/// `error` reply and the stream carries on.
pub async fn run<S, R>(
    ctx: &ProxyContext,
    user_id: &str,
    mut request: ConnectRequest,
    outbound: Outbound<S>,
    mut inbound: R,
) where
    S: Sink<String> + Unpin + Send,
    S::Error: Display,
    R: Stream<Item = Result<String, ProtocolError>> + Unpin + Send,
{
    let opened = open(ctx, user_id, &mut request).await;
    drop(request);

    let (fs, host_name) = match opened {
        Ok(opened) => opened,
        Err(message) => {
            outbound.send(&TransferEvent::error(message)).await;
            return;
        }
    };

    outbound
        .send(&TransferEvent::Connected {
            home: fs.home_dir().to_string(),
            host_name,
        })
        .await;

    loop {
        let text = match next_frame(&mut inbound, ctx.idle_timeout).await {
            Frame::Text(text) => text,
            Frame::Closed => break,
            Frame::Idle => {
                tracing::debug!("File-transfer stream idle, closing");
                break;
            }
        };

        let request = match TransferRequest::decode(&text) {
            Ok(request) => request,
            Err(ProtocolError::InvalidPayload { kind, reason }) => {
                tracing::debug!("Invalid {} payload: {}", kind, reason);
                outbound
                    .send(&TransferEvent::error(format!("invalid {kind} payload")))
                    .await;
                continue;
            }
            Err(e) => {
                tracing::debug!("Ignoring client frame: {}", e);
                continue;
            }
        };

        let reply = handle(fs.as_ref(), request).await;
        if !outbound.send(&reply).await {
            break;
        }
    }

    fs.close().await;
}

async fn open(
    ctx: &ProxyContext,
    user_id: &str,
    request: &mut ConnectRequest,
) -> Result<(Box<dyn RemoteFs>, String), String> {
    let host = resolve_host(ctx.store.as_ref(), &request.host_id, user_id)
        .await
        .map_err(str::to_string)?;
    let auth =
        build_auth(host.auth_kind, &mut request.credential).map_err(|e| e.client_message())?;

    let fs = ctx.dialer.open_sftp(&host, auth).await.map_err(|e| {
        tracing::warn!(host_id = %host.id, "File-transfer open failed: {}", e);
        e.to_string()
    })?;

    Ok((fs, host.name))
}

/// Execute one request and build its reply.
async fn handle(fs: &dyn RemoteFs, request: TransferRequest) -> TransferEvent {
    let result = match request {
        TransferRequest::List { path } => {
            let path = if path.is_empty() {
                fs.home_dir().to_string()
            } else {
                path
            };
            fs.list_dir(&path).await.map(|mut entries| {
                sort_entries(&mut entries);
                TransferEvent::LsResult { path, entries }
            })
        }
        TransferRequest::Get { path } => fs.read_file(&path).await.map(|data| TransferEvent::GetResult {
            name: base_name(&path).to_string(),
            data: BASE64.encode(&data),
            path,
        }),
        TransferRequest::Put { path, data } => {
            let Ok(bytes) = BASE64.decode(data.as_bytes()) else {
                return TransferEvent::error("invalid base64 data");
            };
            fs.write_file(&path, bytes)
                .await
                .map(|()| TransferEvent::Done(DoneOp::Put { path }))
        }
        TransferRequest::Remove { path } => {
            let removed = match fs.remove_dir(&path).await {
                Ok(()) => Ok(()),
                Err(_) => fs.remove_file(&path).await,
            };
            removed.map(|()| TransferEvent::Done(DoneOp::Rm { path }))
        }
        TransferRequest::Mkdir { path } => fs
            .create_dir(&path)
            .await
            .map(|()| TransferEvent::Done(DoneOp::Mkdir { path })),
        TransferRequest::Rename { from, to } => fs
            .rename(&from, &to)
            .await
            .map(|()| TransferEvent::Done(DoneOp::Rename { from, to })),
    };

    result.unwrap_or_else(|e| TransferEvent::error(e.to_string()))
}
