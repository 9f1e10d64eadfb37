//! Zhorn Observers - best-effort observers on the notification bus.
//!
//! Neither observer takes part in enforcement:
//!
//! - [`BotDetector`] classifies the session from interaction signals over a
//!   timeout window and publishes `BotActivity` when nothing human was seen.
//! - [`MetricsRelay`] renames timing measurements and publishes
//!   `MetricAvailable`.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use zhorn_events::NotificationBus;
//! use zhorn_observers::{MetricsOptions, initialize_metrics_tracker};
//!
//! let bus = NotificationBus::new();
//! let mut rx = bus.subscribe();
//! let tracker = initialize_metrics_tracker(&bus, MetricsOptions::default());
//!
//! let relay = tracker.instance().unwrap();
//! relay.track("fcp", json!(180));
//! assert_eq!(rx.drain().len(), 1);
//! tracker.destroy();
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bot;
mod error;
mod lifecycle;
mod metrics;

pub use bot::{
    BotDetector, BotDetectorOptions, BotTest, BotVerdict, DEFAULT_BOT_TIMEOUT, RotationRate,
    Signal,
};
pub use error::{ObserverError, ObserverResult};
pub use lifecycle::{
    BotDetectorHandle, MetricsTrackerHandle, initialize_bot_detector, initialize_metrics_tracker,
};
pub use metrics::{DEFAULT_MAX_MEASURE_TIME, MetricsOptions, MetricsRelay, map_metric};
