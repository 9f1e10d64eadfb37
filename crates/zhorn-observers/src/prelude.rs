//! Common imports for observer consumers.
//!
//! ```
//! use zhorn_observers::prelude::*;
//! ```

pub use crate::{
    BotDetector, BotDetectorHandle, BotDetectorOptions, BotTest, BotVerdict, MetricsOptions,
    MetricsRelay, MetricsTrackerHandle, ObserverError, ObserverResult, RotationRate, Signal,
    initialize_bot_detector, initialize_metrics_tracker,
};
