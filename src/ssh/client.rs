use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Config, Handle};
use russh::{Channel, ChannelMsg, Pty};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{Host, HostKeyPolicy, SshConfig};
use crate::error::SshError;
use crate::security_log;

use super::PtySize;
use super::auth::ResolvedAuth;
use super::handler::ClientHandler;
use super::session::{RemoteShell, spawn_channel_task};

const TERM: &str = "xterm-256color";

/// Dials and authenticates outbound SSH connections.
pub struct SshConnector {
    config: Arc<Config>,
    policy: Arc<HostKeyPolicy>,
    dial_timeout: Duration,
}

impl SshConnector {
    pub fn new(settings: &SshConfig) -> Self {
        // Treat 0 as "no keepalive" to avoid immediate timeout
        let keepalive = (settings.keepalive_interval_secs > 0)
            .then(|| Duration::from_secs(settings.keepalive_interval_secs));

        // No inactivity timeout: an idle terminal stays open as long as the
        // browser does.
        let config = Config {
            inactivity_timeout: None,
            keepalive_interval: keepalive,
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            policy: Arc::new(settings.host_key_policy.clone()),
            dial_timeout: Duration::from_secs(settings.connection_timeout_secs),
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// TCP connect, handshake and authenticate, all within the dial timeout.
    pub async fn connect(
        &self,
        host: &Host,
        auth: ResolvedAuth,
    ) -> Result<Handle<ClientHandler>, SshError> {
        let addr = host.address();

        let stream = timeout(self.dial_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SshError::Timeout(addr.clone()))?
            .map_err(|e| SshError::ConnectionFailed {
                host: host.hostname.clone(),
                port: host.port,
                reason: e.to_string(),
            })?;

        match timeout(self.dial_timeout, self.establish(host, stream, auth)).await {
            Ok(result) => result,
            Err(_) => Err(SshError::Timeout(addr)),
        }
    }

    async fn establish(
        &self,
        host: &Host,
        stream: TcpStream,
        auth: ResolvedAuth,
    ) -> Result<Handle<ClientHandler>, SshError> {
        let handler = ClientHandler::new(host.hostname.clone(), host.port, self.policy.clone());

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| SshError::ConnectionFailed {
                host: host.hostname.clone(),
                port: host.port,
                reason: e.to_string(),
            })?;

        authenticate(&mut handle, host, auth).await?;
        Ok(handle)
    }

    /// Connect, then open a session channel with a PTY and a login shell.
    /// Returns only after the server has confirmed the shell request.
    pub async fn open_shell(
        &self,
        host: &Host,
        auth: ResolvedAuth,
        size: PtySize,
    ) -> Result<RemoteShell, SshError> {
        let handle = self.connect(host, auth).await?;

        let setup = async {
            let mut channel = handle
                .channel_open_session()
                .await
                .map_err(|e| SshError::Channel(e.to_string()))?;

            let mut pending = Vec::new();

            channel
                .request_pty(
                    true,
                    TERM,
                    size.cols as u32,
                    size.rows as u32,
                    0,
                    0,
                    &[
                        (Pty::ECHO, 1),
                        (Pty::TTY_OP_ISPEED, 14400),
                        (Pty::TTY_OP_OSPEED, 14400),
                    ],
                )
                .await
                .map_err(|e| SshError::PtyRequest(e.to_string()))?;
            await_reply(&mut channel, &mut pending)
                .await
                .map_err(SshError::PtyRequest)?;

            channel
                .request_shell(true)
                .await
                .map_err(|e| SshError::ShellRequest(e.to_string()))?;
            await_reply(&mut channel, &mut pending)
                .await
                .map_err(SshError::ShellRequest)?;

            Ok::<_, SshError>((channel, pending))
        };

        let (channel, pending) = match timeout(self.dial_timeout, setup).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                disconnect(&handle).await;
                return Err(e);
            }
            Err(_) => {
                disconnect(&handle).await;
                return Err(SshError::Timeout(host.address()));
            }
        };

        Ok(spawn_channel_task(handle, channel, pending))
    }
}

/// Wait for the server's answer to a want-reply channel request. Output
/// that arrives first is kept in `pending`.
async fn await_reply(
    channel: &mut Channel<client::Msg>,
    pending: &mut Vec<Vec<u8>>,
) -> Result<(), String> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err("rejected by server".to_string()),
            Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                pending.push(data.to_vec());
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                return Err("channel closed".to_string());
            }
            Some(_) => {}
        }
    }
}

pub(crate) async fn disconnect(handle: &Handle<ClientHandler>) {
    if let Err(e) = handle
        .disconnect(russh::Disconnect::ByApplication, "", "en")
        .await
    {
        tracing::debug!("Disconnect failed: {}", e);
    }
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    host: &Host,
    auth: ResolvedAuth,
) -> Result<(), SshError> {
    let method_name = auth.method_name();
    let (hostname, port, username) = (host.hostname.as_str(), host.port, host.username.as_str());

    security_log::log_auth_attempt(hostname, port, username, method_name);

    let result = match auth {
        // expose_secret() only at the point of authentication
        ResolvedAuth::Password(password) => {
            handle
                .authenticate_password(username, password.expose_secret())
                .await
        }
        ResolvedAuth::PublicKey(key) => handle.authenticate_publickey(username, key).await,
    };

    match result {
        Ok(result) if result.success() => {
            security_log::log_auth_success(hostname, port, username, method_name);
            Ok(())
        }
        Ok(_) => {
            let reason = "credentials rejected by server";
            security_log::log_auth_failure(hostname, port, username, method_name, reason);
            Err(SshError::AuthenticationFailed(reason.to_string()))
        }
        Err(e) => {
            let reason = e.to_string();
            security_log::log_auth_failure(hostname, port, username, method_name, &reason);
            Err(SshError::AuthenticationFailed(reason))
        }
    }
}
