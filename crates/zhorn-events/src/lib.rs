//! Zhorn Events - intent bus and observer notifications.
//!
//! This crate provides two buses with very different contracts:
//!
//! 1. [`IntentBus`]: synchronous, single-process publish/veto. Every
//!    subscriber runs to completion, in registration order, before
//!    [`IntentBus::publish`] returns. Decisions are folded first-veto-wins,
//!    but later subscribers still run. A panicking subscriber counts as a veto.
//!
//! 2. [`NotificationBus`]: broadcast of best-effort [`Notification`]s to
//!    observers (outbound intents, blocked calls, bot activity, metrics).
//!    Nothing on this bus can influence a policy decision.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use zhorn_core::{Intent, SinkName};
//! use zhorn_events::{Decision, FnSubscriber, IntentBus, Verdict};
//!
//! let bus = IntentBus::new();
//! bus.register(Arc::new(FnSubscriber::new("deny_all", |_intent| {
//!     Verdict::veto("nothing is allowed")
//! })));
//!
//! let intent = Intent::include(SinkName::SetAttribute, "https://cdn.example.com/app.js");
//! let decision = bus.publish(&intent);
//! assert!(decision.is_vetoed());
//! assert!(intent.is_vetoed());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod intent_bus;
mod notification;
mod notification_bus;

pub use intent_bus::{
    Decision, FnSubscriber, IntentBus, IntentSubscriber, SubscriberId, Verdict, VetoReason,
    panic_message,
};
pub use notification::{Notification, NotificationMetadata};
pub use notification_bus::{DEFAULT_CHANNEL_CAPACITY, NotificationBus, NotificationReceiver};
