use std::time::Duration;

use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::time::timeout;

use crate::config::Host;
use crate::error::SftpError;
use crate::security_log;
use crate::ssh::ResolvedAuth;
use crate::ssh::client::{SshConnector, disconnect};

use super::session::SftpSession;

/// Connect to `host` and start the SFTP subsystem.
pub async fn open_sftp(
    connector: &SshConnector,
    host: &Host,
    auth: ResolvedAuth,
    max_read_bytes: u64,
) -> Result<SftpSession, SftpError> {
    let handle = connector.connect(host, auth).await?;

    let setup = async {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SftpError::Subsystem(format!("Failed to open channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SftpError::Subsystem(e.to_string()))?;

        RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SftpError::Subsystem(e.to_string()))
    };

    let sftp = match timeout(connector.dial_timeout(), setup).await {
        Ok(Ok(sftp)) => sftp,
        Ok(Err(e)) => {
            disconnect(&handle).await;
            return Err(e);
        }
        Err(_) => {
            disconnect(&handle).await;
            return Err(SftpError::Subsystem("timed out".to_string()));
        }
    };

    let home_dir = home_dir(&sftp).await;
    security_log::log_sftp_connect(&host.hostname, host.port, &host.username);

    Ok(SftpSession::new(sftp, handle, home_dir, max_read_bytes))
}

/// Canonical form of ".", which is the login directory. Falls back to "/".
async fn home_dir(sftp: &RusshSftpSession) -> String {
    match timeout(Duration::from_secs(5), sftp.canonicalize(".")).await {
        Ok(Ok(path)) => path,
        Ok(Err(_)) | Err(_) => "/".to_string(),
    }
}
