//! Prelude module - commonly used types for convenient import.
//!
//! Use `use zhorn_events::prelude::*;` to import all essential types.

// Intent bus
pub use crate::{
    Decision, FnSubscriber, IntentBus, IntentSubscriber, SubscriberId, Verdict, VetoReason,
};

// Notifications
pub use crate::{
    DEFAULT_CHANNEL_CAPACITY, Notification, NotificationBus, NotificationMetadata,
    NotificationReceiver,
};
