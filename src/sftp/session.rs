//! SFTP session for file operations

use futures::FutureExt;
use futures::future::BoxFuture;
use russh::client::Handle;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::SftpError;
use crate::ssh::handler::ClientHandler;

use super::RemoteFs;
use super::types::FileEntry;

fn op_error(op: &'static str) -> impl Fn(russh_sftp::client::error::Error) -> SftpError {
    move |e| SftpError::Operation {
        op,
        reason: e.to_string(),
    }
}

/// Read to the end, failing once more than `limit` bytes arrive. The size
/// reported by `stat` is only a hint: the file may grow or the server may
/// not report it.
async fn read_capped<R>(reader: &mut R, path: &str, limit: u64) -> Result<Vec<u8>, SftpError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut data)
        .await
        .map_err(|e| SftpError::Operation {
            op: "read",
            reason: e.to_string(),
        })?;

    if data.len() as u64 > limit {
        return Err(SftpError::TooLarge {
            path: path.to_string(),
            limit,
        });
    }
    Ok(data)
}

/// A live SFTP subsystem plus the SSH connection carrying it.
pub struct SftpSession {
    sftp: RusshSftpSession,
    connection: Handle<ClientHandler>,
    home_dir: String,
    max_read_bytes: u64,
}

impl std::fmt::Debug for SftpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpSession")
            .field("home_dir", &self.home_dir)
            .finish_non_exhaustive()
    }
}

impl SftpSession {
    pub fn new(
        sftp: RusshSftpSession,
        connection: Handle<ClientHandler>,
        home_dir: String,
        max_read_bytes: u64,
    ) -> Self {
        Self {
            sftp,
            connection,
            home_dir,
            max_read_bytes,
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        let read_dir = self.sftp.read_dir(path).await.map_err(op_error("ls"))?;

        Ok(read_dir
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let metadata = entry.metadata();
                FileEntry::new(
                    entry.file_name(),
                    metadata.size.unwrap_or(0),
                    metadata.permissions,
                    metadata.mtime,
                )
            })
            .collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, SftpError> {
        let metadata = self.sftp.metadata(path).await.map_err(op_error("open"))?;
        if metadata.size.unwrap_or(0) > self.max_read_bytes {
            return Err(SftpError::TooLarge {
                path: path.to_string(),
                limit: self.max_read_bytes,
            });
        }

        let mut file = self.sftp.open(path).await.map_err(op_error("open"))?;
        read_capped(&mut file, path, self.max_read_bytes).await
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<(), SftpError> {
        let mut file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .await
            .map_err(op_error("create"))?;

        let io_error = |e: std::io::Error| SftpError::Operation {
            op: "write",
            reason: e.to_string(),
        };
        file.write_all(&data).await.map_err(io_error)?;
        file.shutdown().await.map_err(io_error)
    }
}

impl RemoteFs for SftpSession {
    fn home_dir(&self) -> &str {
        &self.home_dir
    }

    fn list_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<FileEntry>, SftpError>> {
        self.list(path).boxed()
    }

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SftpError>> {
        self.read(path).boxed()
    }

    fn write_file<'a>(&'a self, path: &'a str, data: Vec<u8>) -> BoxFuture<'a, Result<(), SftpError>> {
        self.write(path, data).boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        async move { self.sftp.remove_dir(path).await.map_err(op_error("remove")) }.boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        async move { self.sftp.remove_file(path).await.map_err(op_error("remove")) }.boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        async move { self.sftp.create_dir(path).await.map_err(op_error("mkdir")) }.boxed()
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        async move { self.sftp.rename(from, to).await.map_err(op_error("rename")) }.boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        async move {
            if let Err(e) = self.sftp.close().await {
                tracing::debug!("SFTP close failed: {}", e);
            }
            crate::ssh::client::disconnect(&self.connection).await;
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_within_limit_returns_everything() {
        let mut source: &[u8] = b"twelve bytes";
        let data = read_capped(&mut source, "/tmp/f", 12).await.unwrap();
        assert_eq!(data, b"twelve bytes");
    }

    #[tokio::test]
    async fn read_past_limit_is_rejected() {
        let mut source: &[u8] = b"thirteen byte";
        let err = read_capped(&mut source, "/tmp/f", 12).await.unwrap_err();
        assert!(matches!(err, SftpError::TooLarge { limit: 12, .. }), "{err:?}");
    }
}
