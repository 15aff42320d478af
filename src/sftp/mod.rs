pub mod client;
pub mod session;
pub mod types;

use futures::future::BoxFuture;

use crate::error::SftpError;

pub use client::open_sftp;
pub use session::SftpSession;
pub use types::FileEntry;

/// Remote filesystem operations the file-transfer stream needs. Paths are
/// passed through to the server unmodified.
pub trait RemoteFs: Send + Sync {
    /// Login directory, resolved when the session opened
    fn home_dir(&self) -> &str;

    fn list_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<FileEntry>, SftpError>>;

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SftpError>>;

    /// Create or truncate `path` and write `data`
    fn write_file<'a>(&'a self, path: &'a str, data: Vec<u8>)
    -> BoxFuture<'a, Result<(), SftpError>>;

    fn remove_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>>;

    fn remove_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>>;

    fn create_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>>;

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, Result<(), SftpError>>;

    /// Close the subsystem and the underlying connection
    fn close(&self) -> BoxFuture<'_, ()>;
}
