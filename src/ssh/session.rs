use russh::client::Handle;
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::sync::mpsc;

use crate::error::SshError;

use super::handler::ClientHandler;

/// Requests from the proxy to the task that owns the SSH channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Data(Vec<u8>),
    WindowChange { cols: u32, rows: u32 },
    Close,
}

/// Output from the remote shell, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// stdout and stderr, interleaved as received
    Output(Vec<u8>),
    /// The remote side ended the shell
    Eof,
}

/// A running remote shell, split into the write and read halves so each
/// direction can be driven by its own task.
#[derive(Debug)]
pub struct RemoteShell {
    pub writer: ShellWriter,
    pub reader: ShellReader,
}

impl RemoteShell {
    /// Wrap the two queues of a channel task. Commands are applied in the
    /// order they are queued.
    pub fn new(commands: mpsc::Sender<ShellCommand>, events: mpsc::Receiver<ShellEvent>) -> Self {
        Self {
            writer: ShellWriter { commands },
            reader: ShellReader { events },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShellWriter {
    commands: mpsc::Sender<ShellCommand>,
}

impl ShellWriter {
    /// Send keystrokes to the remote shell
    pub async fn write(&self, data: Vec<u8>) -> Result<(), SshError> {
        self.commands
            .send(ShellCommand::Data(data))
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }

    /// Notify the remote shell of a window size change
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), SshError> {
        self.commands
            .send(ShellCommand::WindowChange {
                cols: cols as u32,
                rows: rows as u32,
            })
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }

    /// Ask the channel task to close the channel and disconnect. Safe to
    /// call after the task has already exited.
    pub async fn close(&self) {
        let _ = self.commands.send(ShellCommand::Close).await;
    }
}

#[derive(Debug)]
pub struct ShellReader {
    events: mpsc::Receiver<ShellEvent>,
}

impl ShellReader {
    /// `None` once the channel task has exited.
    pub async fn next(&mut self) -> Option<ShellEvent> {
        self.events.recv().await
    }
}

/// Spawn the task that owns the SSH connection and channel.
///
/// `pending` holds output that arrived while the shell request was being
/// confirmed; it is delivered before anything else.
pub fn spawn_channel_task(
    handle: Handle<ClientHandler>,
    mut channel: Channel<russh::client::Msg>,
    pending: Vec<Vec<u8>>,
) -> RemoteShell {
    let (command_tx, mut command_rx) = mpsc::channel::<ShellCommand>(256);
    let (event_tx, event_rx) = mpsc::channel::<ShellEvent>(256);

    tokio::spawn(async move {
        for data in pending {
            if event_tx.send(ShellEvent::Output(data)).await.is_err() {
                break;
            }
        }

        loop {
            tokio::select! {
                msg = channel.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            if event_tx.send(ShellEvent::Output(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, .. }) => {
                            if event_tx.send(ShellEvent::Output(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            tracing::debug!("Exit status: {}", exit_status);
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                            let _ = event_tx.send(ShellEvent::Eof).await;
                            break;
                        }
                        Some(_) => {}
                    }
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(ShellCommand::Data(data)) => {
                            if let Err(e) = channel.data(&data[..]).await {
                                tracing::debug!("Failed to send data: {}", e);
                            }
                        }
                        Some(ShellCommand::WindowChange { cols, rows }) => {
                            if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                                tracing::debug!("Failed to send window change: {}", e);
                            }
                        }
                        Some(ShellCommand::Close) | None => break,
                    }
                }
            }
        }

        let _ = channel.eof().await;
        let _ = channel.close().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            tracing::debug!("Disconnect failed: {}", e);
        }
    });

    RemoteShell::new(command_tx, event_rx)
}
