//! Live push channel.
//!
//! The service pushes text frames shaped `{"type": ..., "payload": ...}`.
//! Each frame is re-emitted on the [`EventBus`] under its type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::events::{EventBus, EventKind};
use crate::error::{Error, Result};

/// Payload `status` emitted on [`EventKind::Connection`] when the channel opens.
pub const STATUS_CONNECTED: &str = "connected";

/// Payload `status` emitted on [`EventKind::Connection`] when the channel breaks.
pub const STATUS_OFFLINE: &str = "offline";

/// One frame received from the push channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushMessage {
    /// Event type, e.g. `alert`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event body.
    #[serde(default)]
    pub payload: Value,
}

/// Decode a text frame and emit it. Malformed frames are logged and skipped.
///
/// Returns the event kind emitted, if any.
pub fn dispatch(events: &EventBus, text: &str) -> Option<EventKind> {
    match serde_json::from_str::<PushMessage>(text) {
        Ok(message) => {
            let kind = EventKind::from_wire(&message.kind);
            events.emit(&kind, &message.payload);
            Some(kind)
        }
        Err(e) => {
            warn!("Skipping malformed push message: {}", e);
            None
        }
    }
}

/// Payload of a connection event.
#[must_use]
pub fn connection_payload(status: &str) -> Value {
    json!({ "status": status })
}

/// Receive side of the live channel.
#[async_trait]
pub trait PushChannel: Send + Sync + std::fmt::Debug {
    /// Connect and start delivering frames to `events`.
    ///
    /// Emits a `connection` event with status `connected` once open. If the
    /// channel later breaks, a `connection` event with status `offline` is
    /// emitted. Opening an already open channel is a no-op.
    async fn open(&self, events: EventBus) -> Result<()>;

    /// Stop delivering frames. No event is emitted.
    fn close(&self);

    /// Whether the channel is currently delivering frames.
    fn is_open(&self) -> bool;
}

/// [`PushChannel`] over a WebSocket.
#[derive(Debug)]
pub struct WebSocketPush {
    url: String,
    connect_timeout: Duration,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketPush {
    /// Create a channel for `url`. Nothing is connected until [`PushChannel::open`].
    #[must_use]
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            running: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    /// URL the channel connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushChannel for WebSocketPush {
    async fn open(&self, events: EventBus) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut stream = match timeout(self.connect_timeout, connect_async(self.url.as_str())).await
        {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                return Err(Error::push_channel(format!(
                    "failed to connect to {}: {e}",
                    self.url
                )))
            }
            Err(_) => {
                return Err(Error::push_channel(format!(
                    "timed out connecting to {}",
                    self.url
                )))
            }
        };

        info!("Push channel connected to {}", self.url);
        self.running.store(true, Ordering::SeqCst);
        events.emit(&EventKind::Connection, &connection_payload(STATUS_CONNECTED));

        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&events, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Push channel closed by server");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Push channel error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            // Still flagged as running means the channel ended on its own.
            if running.swap(false, Ordering::SeqCst) {
                events.emit(&EventKind::Connection, &connection_payload(STATUS_OFFLINE));
            }
        });

        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            debug!("Push channel closed");
        }
    }

    fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketPush {
    fn drop(&mut self) {
        self.close();
    }
}
