use std::sync::Arc;

use russh::client::Handler;
use russh::keys::{HashAlg, PublicKey};

use crate::config::HostKeyPolicy;
use crate::error::SshError;

/// SSH client handler; its only job is the server key check.
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: Arc<HostKeyPolicy>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, policy: Arc<HostKeyPolicy>) -> Self {
        Self { host, port, policy }
    }
}

impl Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();

        let path = match &*self.policy {
            HostKeyPolicy::AcceptAny => {
                tracing::debug!(
                    "Accepting host key for {}:{} ({})",
                    self.host,
                    self.port,
                    fingerprint
                );
                return Ok(true);
            }
            HostKeyPolicy::KnownHosts { path } => path.clone(),
        };

        let host = self.host.clone();
        let port = self.port;
        let key = server_public_key.clone();
        let known = tokio::task::spawn_blocking(move || {
            russh::keys::known_hosts::check_known_hosts_path(&host, port, &key, &path)
        })
        .await
        .map_err(|e| SshError::HostKeyVerification(format!("Host key check failed: {}", e)))?;

        match known {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::warn!(
                    "Unknown host key for {}:{} - {}",
                    self.host,
                    self.port,
                    fingerprint
                );
                Err(SshError::HostKeyVerification(format!(
                    "host key {} is not in known_hosts",
                    fingerprint
                )))
            }
            Err(e) => {
                tracing::warn!(
                    "HOST KEY MISMATCH for {}:{} - {} ({})",
                    self.host,
                    self.port,
                    fingerprint,
                    e
                );
                Err(SshError::HostKeyVerification(e.to_string()))
            }
        }
    }
}
