//! Notification bus: the hub's append-only event log.
//!
//! DESIGN
//! ======
//! One store, two read paths. `publish` appends to the queue and fans the
//! new entry out to every live subscriber in the same critical section, so
//! a subscriber never sees notifications out of queue order. `read` returns
//! a copy of the whole queue for clients that poll.
//!
//! CONCURRENCY
//! ===========
//! The queue lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Fan-out uses `try_send`: a subscriber whose channel is full
//! misses that notification, and one whose receiver is gone is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-subscriber channel depth.
pub const SUBSCRIBER_BUFFER: usize = 64;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MovementEvent,
    ThreeWrongGuesses,
    FrontDoorAlarm,
    Alarm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub unread: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification not found: {0}")]
    NotFound(u64),
}

impl crate::frame::ErrorCode for NotificationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
        }
    }
}

#[derive(Default)]
struct Inner {
    queue: Vec<Notification>,
    last_id: u64,
    subscribers: HashMap<Uuid, mpsc::Sender<Notification>>,
}

impl Inner {
    /// Wall-clock milliseconds, bumped past the previous id when two
    /// notifications land in the same millisecond.
    fn next_id(&mut self, now: OffsetDateTime) -> u64 {
        let millis = u64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(0);
        self.last_id = millis.max(self.last_id + 1);
        self.last_id
    }
}

// =============================================================================
// BUS
// =============================================================================

#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<Mutex<Inner>>,
}

impl NotificationBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a notification and push it to every subscriber.
    pub fn publish(&self, kind: NotificationKind, message: impl Into<String>) -> Notification {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.lock();
        let notification = Notification {
            id: inner.next_id(now),
            kind,
            message: message.into(),
            timestamp: now.format(&Rfc3339).unwrap_or_default(),
            unread: true,
        };
        inner.queue.push(notification.clone());

        inner.subscribers.retain(|client_id, tx| match tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(%client_id, id = notification.id, "subscriber channel full; notification skipped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%client_id, "subscriber gone; pruned");
                false
            }
        });

        info!(id = notification.id, kind = ?notification.kind, message = %notification.message, "notification published");
        notification
    }

    /// Snapshot of the whole queue in insertion order.
    #[must_use]
    pub fn read(&self) -> Vec<Notification> {
        self.lock().queue.clone()
    }

    /// Clear the unread flag on `id`. Marking twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::NotFound`] for an unknown id.
    pub fn mark_read(&self, id: u64) -> Result<Notification, NotificationError> {
        let mut inner = self.lock();
        let entry = inner.queue.iter_mut().find(|n| n.id == id).ok_or(NotificationError::NotFound(id))?;
        entry.unread = false;
        Ok(entry.clone())
    }

    /// Register a real-time subscriber. Only notifications published after
    /// this call are delivered on the returned receiver.
    pub fn subscribe(&self, client_id: Uuid) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.lock().subscribers.insert(client_id, tx);
        rx
    }

    pub fn unsubscribe(&self, client_id: Uuid) {
        self.lock().subscribers.remove(&client_id);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

#[cfg(test)]
#[path = "notifications_test.rs"]
mod tests;
