use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, SinkExt};
use serde::Serialize;
use tokio::sync::Mutex;

/// Serialized writer to the browser.
///
/// Both directions of a terminal stream write through clones of the same
/// `Outbound`, so frames never interleave. Sends are best effort: a failed
/// write is logged and reported as `false`, never as an error.
pub struct Outbound<S> {
    sink: Arc<Mutex<S>>,
}

impl<S> Clone for Outbound<S> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<S> Outbound<S>
where
    S: Sink<String> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Serialize and write one frame. Returns whether the write succeeded.
    pub async fn send<M: Serialize>(&self, message: &M) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode outbound frame: {}", e);
                return false;
            }
        };

        let mut sink = self.sink.lock().await;
        match sink.send(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Client write failed: {}", e);
                false
            }
        }
    }

    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            tracing::debug!("Client close failed: {}", e);
        }
    }
}
