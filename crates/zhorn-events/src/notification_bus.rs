//! Broadcast bus for observer notifications.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::notification::Notification;

/// Default channel capacity for the notification bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcasts notifications to every connected receiver.
///
/// Publishing never blocks and never fails: with no receivers the
/// notification is simply dropped. Slow receivers lose the oldest
/// notifications rather than applying back-pressure to guarded calls.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Arc<Notification>>,
    capacity: usize,
}

impl NotificationBus {
    /// Create a new bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    /// Publish a notification.
    ///
    /// Returns the number of receivers that were sent the notification.
    pub fn publish(&self, notification: Notification) -> usize {
        let event_type = notification.event_type();
        match self.sender.send(Arc::new(notification)) {
            Ok(count) => {
                trace!(event_type, receiver_count = count, "Notification published");
                count
            },
            Err(_) => {
                trace!(event_type, "No receivers for notification");
                0
            },
        }
    }

    /// Subscribe to every notification.
    #[must_use]
    pub fn subscribe(&self) -> NotificationReceiver {
        NotificationReceiver::new(self.sender.subscribe(), None)
    }

    /// Subscribe to notifications of a single wire type (e.g. `agentbotactivity`).
    #[must_use]
    pub fn subscribe_type(&self, event_type: impl Into<String>) -> NotificationReceiver {
        NotificationReceiver::new(self.sender.subscribe(), Some(event_type.into()))
    }

    /// Number of connected receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a [`NotificationBus`].
pub struct NotificationReceiver {
    receiver: broadcast::Receiver<Arc<Notification>>,
    event_type: Option<String>,
}

impl NotificationReceiver {
    fn new(receiver: broadcast::Receiver<Arc<Notification>>, event_type: Option<String>) -> Self {
        Self {
            receiver,
            event_type,
        }
    }

    fn matches(&self, notification: &Notification) -> bool {
        self.event_type
            .as_deref()
            .is_none_or(|t| t == notification.event_type())
    }

    /// Receive the next matching notification.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Arc<Notification>> {
        loop {
            match self.receiver.recv().await {
                Ok(n) if self.matches(&n) => return Some(n),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Notification receiver lagged, notifications dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next matching notification without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Notification>> {
        loop {
            match self.receiver.try_recv() {
                Ok(n) if self.matches(&n) => return Some(n),
                Ok(_) => {},
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Notification receiver lagged, notifications dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }

    /// Drain every matching notification currently queued.
    pub fn drain(&mut self) -> Vec<Arc<Notification>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
