//! Status channel: the single multi-producer stream of human-readable
//! messages a presentation layer listens to.
//!
//! Backed by a `broadcast` channel. Publishing never blocks and never fails;
//! with no subscriber the message is only logged. A slow subscriber that lags
//! loses the oldest messages, which is fine since the latest one wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use leadable_core::SyncName;

pub const DEFAULT_STATUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Error,
}

/// One published status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub at: DateTime<Utc>,
    pub sync: SyncName,
    pub level: StatusLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: broadcast::Sender<StatusEvent>,
}

impl Default for StatusSink {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_CAPACITY)
    }
}

impl StatusSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn info(&self, sync: &SyncName, message: impl Into<String>) -> StatusEvent {
        self.publish(sync, StatusLevel::Info, message.into())
    }

    pub fn error(&self, sync: &SyncName, message: impl Into<String>) -> StatusEvent {
        self.publish(sync, StatusLevel::Error, message.into())
    }

    fn publish(&self, sync: &SyncName, level: StatusLevel, message: String) -> StatusEvent {
        match level {
            StatusLevel::Info => tracing::info!(sync = %sync, "{message}"),
            StatusLevel::Error => tracing::warn!(sync = %sync, "{message}"),
        }
        let event = StatusEvent {
            at: Utc::now(),
            sync: sync.clone(),
            level,
            message,
        };
        // No receivers is not an error: nobody is watching right now.
        let _ = self.tx.send(event.clone());
        event
    }
}
