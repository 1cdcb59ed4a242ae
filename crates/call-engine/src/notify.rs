//! Lifecycle notifications
//!
//! The engine reports call milestones to the outside world as JSON payloads
//! on per-kind topics. Emission of hangup-family notifications is gated by
//! the registry's idempotency markers, so a notification is externally
//! visible at most once per channel within the marker TTL no matter how many
//! handlers race toward it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

/// Notification topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Ringing,
    State,
    Hangup,
    Rejected,
    Cancelled,
}

impl NotificationKind {
    pub fn topic(&self) -> &'static str {
        match self {
            NotificationKind::Ringing => "call.ringing",
            NotificationKind::State => "call.state",
            NotificationKind::Hangup => "call.hangup",
            NotificationKind::Rejected => "call.rejected",
            NotificationKind::Cancelled => "call.cancelled",
        }
    }
}

/// One lifecycle notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNotification {
    pub kind: NotificationKind,
    pub channel_id: String,
    pub linked_id: String,
    pub ani: String,
    pub dnis: String,
    pub direction: String,
    /// Signaling state for `call.state`, absent otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Hangup/rejection reason, absent for state notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CallNotification {
    pub fn new(kind: NotificationKind, channel_id: &str, linked_id: &str) -> Self {
        Self {
            kind,
            channel_id: channel_id.to_string(),
            linked_id: linked_id.to_string(),
            ani: String::new(),
            dnis: String::new(),
            direction: "unknown".to_string(),
            state: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_party(mut self, ani: &str, dnis: &str, direction: &str) -> Self {
        self.ani = ani.to_string();
        self.dnis = dnis.to_string();
        self.direction = direction.to_string();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Where notifications go
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: CallNotification) -> Result<()>;
}

/// In-process broadcast sink
///
/// Fans notifications out to any number of subscribers over a tokio
/// broadcast channel. Dropping all receivers is not an error: the engine
/// keeps publishing into the void, which is the behaviour we want for an
/// optional observer surface.
pub struct BroadcastSink {
    tx: broadcast::Sender<CallNotification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallNotification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn publish(&self, notification: CallNotification) -> Result<()> {
        tracing::debug!(
            "Publishing {} for channel {}",
            notification.kind.topic(),
            notification.channel_id
        );
        // A send error just means nobody is listening right now
        let _ = self.tx.send(notification);
        Ok(())
    }
}
