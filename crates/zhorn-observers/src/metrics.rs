//! Performance metrics relay.
//!
//! Raw measurements from the host's timing source are renamed and forwarded
//! as [`Notification::MetricAvailable`]. Nothing here affects enforcement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, trace};
use zhorn_events::{Notification, NotificationBus, NotificationMetadata};

/// Default cut-off after which measurements are dropped.
pub const DEFAULT_MAX_MEASURE_TIME: Duration = Duration::from_millis(15_000);

/// Relay settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsOptions {
    /// Measurements arriving later than this after start are dropped.
    pub max_measure_time: Duration,
    /// Relay `resourceTiming` entries.
    pub resource_timing: bool,
    /// Relay `elementTiming` entries.
    pub element_timing: bool,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            max_measure_time: DEFAULT_MAX_MEASURE_TIME,
            resource_timing: false,
            element_timing: false,
        }
    }
}

impl MetricsOptions {
    /// Set the cut-off.
    #[must_use]
    pub fn with_max_measure_time(mut self, max: Duration) -> Self {
        self.max_measure_time = max;
        self
    }

    /// Relay resource timing entries.
    #[must_use]
    pub fn with_resource_timing(mut self) -> Self {
        self.resource_timing = true;
        self
    }

    /// Relay element timing entries.
    #[must_use]
    pub fn with_element_timing(mut self) -> Self {
        self.element_timing = true;
        self
    }
}

/// Forwards measurements to the notification bus.
#[derive(Debug)]
pub struct MetricsRelay {
    bus: NotificationBus,
    options: MetricsOptions,
    started: Instant,
    stopped: AtomicBool,
}

impl MetricsRelay {
    /// Relay publishing to `bus`. The measurement clock starts now.
    #[must_use]
    pub fn new(bus: NotificationBus, options: MetricsOptions) -> Self {
        Self {
            bus,
            options,
            started: Instant::now(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Settings in effect.
    #[must_use]
    pub fn options(&self) -> MetricsOptions {
        self.options
    }

    /// Time since the relay started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop relaying. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Forward one measurement. Returns whether a notification was published.
    pub fn track(&self, metric_name: &str, data: Value) -> bool {
        if self.is_stopped() {
            return false;
        }
        if self.elapsed() > self.options.max_measure_time {
            debug!(metric = metric_name, "Measurement past the cut-off, dropped");
            return false;
        }
        let gated = match metric_name {
            "resourceTiming" => !self.options.resource_timing,
            "elementTiming" => !self.options.element_timing,
            _ => false,
        };
        if gated {
            return false;
        }
        let Some((metric, payload)) = map_metric(metric_name, data) else {
            trace!(metric = metric_name, "Incomplete measurement, dropped");
            return false;
        };
        trace!(metric = %metric, "Relaying metric");
        self.bus.publish(Notification::MetricAvailable {
            metadata: NotificationMetadata::new("metrics"),
            metric,
            payload,
        });
        true
    }
}

/// Rename a raw measurement and shape its payload. Returns `None` for
/// structured measurements missing their key field.
#[must_use]
pub fn map_metric(metric_name: &str, data: Value) -> Option<(String, Value)> {
    let renamed = match metric_name {
        "navigationTiming" => {
            return is_truthy(data.get("timeToFirstByte"))
                .then(|| (metric_name.to_owned(), data));
        },
        "networkInformation" => {
            return is_truthy(data.get("effectiveType")).then(|| (metric_name.to_owned(), data));
        },
        "resourceTiming" | "elementTiming" => return Some((metric_name.to_owned(), data)),
        "fp" => "firstPaint",
        "fcp" => "firstContentfulPaint",
        "fid" => "firstInputDelay",
        "lcp" => "largestContentfulPaint",
        "cls" => "cumulativeLayoutShift",
        "clsFinal" => "cumulativeLayoutShiftFinal",
        "tbt" => "totalBlockingTime",
        other => other,
    };
    Some((renamed.to_owned(), json!({ "duration": data })))
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
