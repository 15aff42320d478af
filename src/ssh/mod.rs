pub mod auth;
pub mod client;
pub mod handler;
pub mod session;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::config::Host;
use crate::error::{SftpError, SshError};
use crate::sftp::RemoteFs;

pub use auth::{InFlightCredential, ResolvedAuth, build_auth};
pub use client::SshConnector;
pub use session::{RemoteShell, ShellCommand, ShellEvent, ShellReader, ShellWriter};

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtySize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl PtySize {
    /// Zero in either dimension means "not specified" and takes the default.
    pub fn or_default(cols: u16, rows: u16) -> Self {
        let fallback = Self::default();
        Self {
            cols: if cols == 0 { fallback.cols } else { cols },
            rows: if rows == 0 { fallback.rows } else { rows },
        }
    }
}

/// Opens remote sessions on behalf of the proxy.
pub trait RemoteDialer: Send + Sync {
    /// Interactive shell with a PTY, running once this resolves.
    fn open_shell<'a>(
        &'a self,
        host: &'a Host,
        auth: ResolvedAuth,
        size: PtySize,
    ) -> BoxFuture<'a, Result<RemoteShell, SshError>>;

    fn open_sftp<'a>(
        &'a self,
        host: &'a Host,
        auth: ResolvedAuth,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteFs>, SftpError>>;
}

/// [`SshConnector`] bundled with the SFTP read limit.
pub struct SshDialer {
    connector: SshConnector,
    max_read_bytes: u64,
}

impl SshDialer {
    pub fn new(connector: SshConnector, max_read_bytes: u64) -> Self {
        Self {
            connector,
            max_read_bytes,
        }
    }
}

impl RemoteDialer for SshDialer {
    fn open_shell<'a>(
        &'a self,
        host: &'a Host,
        auth: ResolvedAuth,
        size: PtySize,
    ) -> BoxFuture<'a, Result<RemoteShell, SshError>> {
        self.connector.open_shell(host, auth, size).boxed()
    }

    fn open_sftp<'a>(
        &'a self,
        host: &'a Host,
        auth: ResolvedAuth,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteFs>, SftpError>> {
        async move {
            let session =
                crate::sftp::open_sftp(&self.connector, host, auth, self.max_read_bytes).await?;
            Ok(Box::new(session) as Box<dyn RemoteFs>)
        }
        .boxed()
    }
}
