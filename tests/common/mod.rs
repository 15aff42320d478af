//! Common test utilities: in-memory clients and fake remotes.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::channel::mpsc as client_mpsc;
use futures::future::{BoxFuture, ready};
use futures::{FutureExt, Sink, StreamExt};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shellgate::config::{AuthKind, Host};
use shellgate::error::{ProtocolError, SftpError, SshError};
use shellgate::proxy::{self, Flavor, Outbound, ProxyContext};
use shellgate::sftp::{FileEntry, RemoteFs};
use shellgate::ssh::{PtySize, RemoteDialer, RemoteShell, ResolvedAuth, ShellCommand, ShellEvent};
use shellgate::store::MemoryStore;

pub const OWNER: &str = "alice";
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// One `open_shell` or `open_sftp` call as the dialer saw it.
#[derive(Debug, Clone)]
pub struct DialAttempt {
    pub host_id: uuid::Uuid,
    pub size: Option<PtySize>,
    pub method: &'static str,
    /// Password secret, when password auth was used
    pub password: Option<String>,
}

/// The remote side of a fake shell.
pub struct RemoteEnd {
    pub commands: mpsc::Receiver<ShellCommand>,
    pub events: mpsc::Sender<ShellEvent>,
}

impl RemoteEnd {
    pub async fn next_command(&mut self) -> ShellCommand {
        tokio::time::timeout(RECV_TIMEOUT, self.commands.recv())
            .await
            .expect("timed out waiting for shell command")
            .expect("shell command queue closed")
    }

    pub async fn output(&self, data: &str) {
        self.events
            .send(ShellEvent::Output(data.as_bytes().to_vec()))
            .await
            .expect("engine dropped shell reader");
    }
}

#[derive(Default)]
pub struct FakeDialer {
    pub attempts: Mutex<Vec<DialAttempt>>,
    /// Fail every dial with this error text
    pub fail_with: Option<String>,
    /// Panic inside `open_shell`
    pub panic_on_dial: bool,
    remotes: Mutex<Vec<RemoteEnd>>,
    pub fs: FakeFs,
}

impl FakeDialer {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_dial: true,
            ..Self::default()
        }
    }

    pub fn with_fs(fs: FakeFs) -> Self {
        Self {
            fs,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<DialAttempt> {
        self.attempts.lock().clone()
    }

    /// Remote end of the most recent shell, once the engine has opened one.
    pub async fn remote(&self) -> RemoteEnd {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let popped = self.remotes.lock().pop();
            if let Some(remote) = popped {
                return remote;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "engine never opened a shell"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn record(&self, host: &Host, size: Option<PtySize>, auth: &ResolvedAuth) {
        let password = match auth {
            ResolvedAuth::Password(secret) => Some(secret.expose_secret().to_string()),
            ResolvedAuth::PublicKey(_) => None,
        };
        self.attempts.lock().push(DialAttempt {
            host_id: host.id,
            size,
            method: auth.method_name(),
            password,
        });
    }
}

impl RemoteDialer for FakeDialer {
    fn open_shell<'a>(
        &'a self,
        host: &'a Host,
        auth: ResolvedAuth,
        size: PtySize,
    ) -> BoxFuture<'a, Result<RemoteShell, SshError>> {
        self.record(host, Some(size), &auth);
        assert!(!self.panic_on_dial, "dialer blew up");
        let result = match &self.fail_with {
            Some(reason) => Err(SshError::ConnectionFailed {
                host: host.hostname.clone(),
                port: host.port,
                reason: reason.clone(),
            }),
            None => {
                let (command_tx, command_rx) = mpsc::channel(64);
                let (event_tx, event_rx) = mpsc::channel(64);
                self.remotes.lock().push(RemoteEnd {
                    commands: command_rx,
                    events: event_tx,
                });
                Ok(RemoteShell::new(command_tx, event_rx))
            }
        };
        ready(result).boxed()
    }

    fn open_sftp<'a>(
        &'a self,
        host: &'a Host,
        auth: ResolvedAuth,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteFs>, SftpError>> {
        self.record(host, None, &auth);
        let result: Result<Box<dyn RemoteFs>, SftpError> = match &self.fail_with {
            Some(reason) => Err(SftpError::ConnectionFailed(reason.clone())),
            None => Ok(Box::new(self.fs.clone())),
        };
        ready(result).boxed()
    }
}

#[derive(Default)]
struct FsState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// In-memory remote filesystem. Clones share state.
#[derive(Clone, Default)]
pub struct FakeFs {
    state: Arc<Mutex<FsState>>,
    closed: Arc<AtomicBool>,
    home: Arc<str>,
}

fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => ".",
    }
}

fn op_error(op: &'static str, reason: &str) -> SftpError {
    SftpError::Operation {
        op,
        reason: reason.to_string(),
    }
}

impl FakeFs {
    pub fn new(home: &str) -> Self {
        let fs = Self {
            home: Arc::from(home),
            ..Self::default()
        };
        fs.state.lock().dirs.insert("/".to_string());
        fs.mkdir_all(home);
        fs
    }

    pub fn mkdir_all(&self, path: &str) {
        let mut state = self.state.lock();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state.dirs.insert(current.clone());
        }
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.state.lock().files.insert(path.to_string(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().dirs.contains(path)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn list(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        let state = self.state.lock();
        if !state.dirs.contains(path) {
            return Err(op_error("ls", "no such file"));
        }
        let name_of = |p: &str| p.rsplit('/').next().unwrap_or_default().to_string();

        let dirs = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent(d) == path)
            .map(|d| FileEntry::new(name_of(d), 4096, Some(0o040755), Some(1_700_000_000)));
        let files = state
            .files
            .iter()
            .filter(|(f, _)| parent(f) == path)
            .map(|(f, data)| {
                FileEntry::new(name_of(f), data.len() as u64, Some(0o100644), Some(1_700_000_000))
            });
        // Deliberately unsorted: files before directories
        Ok(files.chain(dirs).collect())
    }
}

impl RemoteFs for FakeFs {
    fn home_dir(&self) -> &str {
        &self.home
    }

    fn list_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<FileEntry>, SftpError>> {
        ready(self.list(path)).boxed()
    }

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SftpError>> {
        let result = self.file(path).ok_or_else(|| op_error("open", "no such file"));
        ready(result).boxed()
    }

    fn write_file<'a>(
        &'a self,
        path: &'a str,
        data: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), SftpError>> {
        let result = if self.has_dir(parent(path)) {
            self.add_file(path, &data);
            Ok(())
        } else {
            Err(op_error("create", "no such file"))
        };
        ready(result).boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        let mut state = self.state.lock();
        let has_children = state.dirs.iter().any(|d| d != path && parent(d) == path)
            || state.files.keys().any(|f| parent(f) == path);
        let result = if has_children {
            Err(op_error("remove", "directory not empty"))
        } else if state.dirs.remove(path) {
            Ok(())
        } else {
            Err(op_error("remove", "no such file"))
        };
        ready(result).boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        let result = match self.state.lock().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(op_error("remove", "no such file")),
        };
        ready(result).boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        let result = if self.has_dir(path) {
            Err(op_error("mkdir", "file exists"))
        } else {
            self.state.lock().dirs.insert(path.to_string());
            Ok(())
        };
        ready(result).boxed()
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        let mut state = self.state.lock();
        let result = match state.files.remove(from) {
            Some(data) => {
                state.files.insert(to.to_string(), data);
                Ok(())
            }
            None => Err(op_error("rename", "no such file")),
        };
        ready(result).boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.closed.store(true, Ordering::SeqCst);
        ready(()).boxed()
    }
}

/// The browser half of an in-memory stream.
pub struct TestClient {
    tx: Option<client_mpsc::UnboundedSender<Result<String, ProtocolError>>>,
    rx: client_mpsc::UnboundedReceiver<String>,
}

impl TestClient {
    pub fn send(&self, frame: Value) {
        self.send_text(&frame.to_string());
    }

    pub fn send_text(&self, text: &str) {
        self.tx
            .as_ref()
            .expect("client already hung up")
            .unbounded_send(Ok(text.to_string()))
            .expect("engine dropped inbound stream");
    }

    /// Drop the inbound half, as if the socket went away.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    pub async fn recv(&mut self) -> Value {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.rx.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended");
        serde_json::from_str(&text).expect("frame is not JSON")
    }

    /// `None` once the engine has released the outbound half.
    pub async fn recv_end(&mut self) -> Option<Value> {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.rx.next())
            .await
            .expect("timed out waiting for end of stream")?;
        Some(serde_json::from_str(&text).expect("frame is not JSON"))
    }

    pub async fn expect(&mut self, kind: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["type"], kind, "unexpected frame {frame}");
        frame["payload"].clone()
    }
}

/// Run `serve_stream` on a fresh in-memory stream pair.
pub fn spawn_stream(
    flavor: Flavor,
    ctx: ProxyContext,
    client_addr: &str,
) -> (TestClient, JoinHandle<()>) {
    spawn_stream_via(flavor, ctx, client_addr, |sink| sink)
}

/// Like [`spawn_stream`], with the engine writing through `wrap(sink)`.
pub fn spawn_stream_via<S, F>(
    flavor: Flavor,
    ctx: ProxyContext,
    client_addr: &str,
    wrap: F,
) -> (TestClient, JoinHandle<()>)
where
    F: FnOnce(client_mpsc::UnboundedSender<String>) -> S,
    S: Sink<String> + Unpin + Send + 'static,
    S::Error: Display,
{
    let (in_tx, in_rx) = client_mpsc::unbounded::<Result<String, ProtocolError>>();
    let (out_tx, out_rx) = client_mpsc::unbounded::<String>();
    let outbound = Outbound::new(wrap(out_tx));
    let client_addr = client_addr.to_string();

    let handle = tokio::spawn(async move {
        proxy::serve_stream(flavor, &ctx, OWNER, &client_addr, outbound, in_rx).await;
    });

    (
        TestClient {
            tx: Some(in_tx),
            rx: out_rx,
        },
        handle,
    )
}

pub fn password_host(name: &str) -> Host {
    Host::new(OWNER, name, "10.0.0.5", "deploy", AuthKind::Password)
}

pub fn context(store: Arc<MemoryStore>, dialer: Arc<FakeDialer>) -> ProxyContext {
    ProxyContext {
        store,
        dialer,
        idle_timeout: None,
    }
}

pub fn connect_frame(host: &Host, credential: &str) -> Value {
    serde_json::json!({
        "type": "connect",
        "payload": {
            "host_id": host.id.to_string(),
            "credential": credential,
            "cols": 120,
            "rows": 40,
        }
    })
}
