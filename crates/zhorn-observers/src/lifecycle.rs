//! Activation helpers returning destroyable handles.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zhorn_core::{GuardError, GuardResult};
use zhorn_events::NotificationBus;

use crate::bot::{BotDetector, BotDetectorOptions, BotVerdict, Signal};
use crate::error::{ObserverError, ObserverResult};
use crate::metrics::{MetricsOptions, MetricsRelay};

// ---------------------------------------------------------------------------
// Bot detector
// ---------------------------------------------------------------------------

/// Handle to a running bot detector. The detector itself is not exposed.
#[derive(Debug)]
pub struct BotDetectorHandle {
    detector: Arc<BotDetector>,
    cancel: CancellationToken,
    task: JoinHandle<Option<BotVerdict>>,
}

impl BotDetectorHandle {
    /// Feed a host signal. Ignored after [`destroy`](Self::destroy).
    pub fn record(&self, signal: &Signal) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.detector.record(signal)
    }

    /// Stop monitoring. Returns `false` if already destroyed.
    pub fn destroy(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        info!("Bot detector destroyed");
        true
    }

    /// Whether the detector is still listening.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Always fails: the detector's internals are private.
    ///
    /// # Errors
    ///
    /// Always returns [`GuardError::InstanceNotAccessible`].
    pub fn instance(&self) -> GuardResult<Arc<BotDetector>> {
        Err(GuardError::InstanceNotAccessible {
            subsystem: "bot detector",
        })
    }

    /// Wait for the observation window to close. `None` if destroyed first.
    pub async fn finished(self) -> Option<BotVerdict> {
        self.task.await.ok().flatten()
    }
}

/// Start a bot detector on the current Tokio runtime.
///
/// # Errors
///
/// Returns [`ObserverError::NoRuntime`] outside a Tokio runtime.
pub fn initialize_bot_detector(
    bus: &NotificationBus,
    options: BotDetectorOptions,
) -> ObserverResult<BotDetectorHandle> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| ObserverError::NoRuntime("bot detector"))?;
    let detector = Arc::new(BotDetector::new(bus.clone(), options));
    let cancel = CancellationToken::new();

    let task = {
        let detector = Arc::clone(&detector);
        let cancel = cancel.clone();
        runtime.spawn(async move { detector.monitor(&cancel).await })
    };
    info!(timeout_ms = ?detector.timeout().as_millis(), "Bot detector started");

    Ok(BotDetectorHandle {
        detector,
        cancel,
        task,
    })
}

// ---------------------------------------------------------------------------
// Metrics tracker
// ---------------------------------------------------------------------------

/// Handle to a metrics relay.
#[derive(Debug, Clone)]
pub struct MetricsTrackerHandle {
    relay: Arc<MetricsRelay>,
}

impl MetricsTrackerHandle {
    /// Stop relaying. Returns `false` if already destroyed.
    pub fn destroy(&self) -> bool {
        let stopped = self.relay.stop();
        if stopped {
            info!("Metrics tracker destroyed");
        }
        stopped
    }

    /// The relay, for feeding measurements.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the other activation handles.
    pub fn instance(&self) -> GuardResult<Arc<MetricsRelay>> {
        Ok(Arc::clone(&self.relay))
    }
}

/// Start a metrics relay. The cut-off clock starts now.
#[must_use]
pub fn initialize_metrics_tracker(
    bus: &NotificationBus,
    options: MetricsOptions,
) -> MetricsTrackerHandle {
    info!(
        max_measure_ms = ?options.max_measure_time.as_millis(),
        resource_timing = options.resource_timing,
        element_timing = options.element_timing,
        "Metrics tracker started"
    );
    MetricsTrackerHandle {
        relay: Arc::new(MetricsRelay::new(bus.clone(), options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use zhorn_events::Notification;

    use crate::bot::BotTest;

    #[tokio::test(start_paused = true)]
    async fn test_detector_publishes_after_window() {
        let bus = NotificationBus::new();
        let mut rx = bus.subscribe_type("agentbotactivity");
        let handle = initialize_bot_detector(
            &bus,
            BotDetectorOptions::default().with_timeout(Duration::from_millis(1500)),
        )
        .unwrap();

        let verdict = handle.finished().await.unwrap();
        assert!(verdict.is_bot);
        assert!(matches!(
            rx.try_recv().as_deref(),
            Some(Notification::BotActivity { captured: true, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detector_human_signal_before_window() {
        let bus = NotificationBus::new();
        let mut rx = bus.subscribe();
        let handle = initialize_bot_detector(
            &bus,
            BotDetectorOptions::default().with_tests([BotTest::MouseMove]),
        )
        .unwrap();

        assert!(handle.record(&Signal::MouseMove));
        let verdict = handle.finished().await.unwrap();
        assert!(verdict.all_matched);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_detector() {
        let bus = NotificationBus::new();
        let mut rx = bus.subscribe();
        let handle = initialize_bot_detector(&bus, BotDetectorOptions::default()).unwrap();

        assert!(handle.destroy());
        assert!(!handle.destroy());
        assert!(!handle.is_active());
        assert!(!handle.record(&Signal::Scroll));
        assert!(handle.finished().await.is_none());
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_detector_instance_not_accessible() {
        let handle =
            initialize_bot_detector(&NotificationBus::new(), BotDetectorOptions::default())
                .unwrap();
        assert!(matches!(
            handle.instance(),
            Err(GuardError::InstanceNotAccessible { subsystem: "bot detector" })
        ));
        handle.destroy();
    }

    #[test]
    fn test_detector_requires_runtime() {
        assert!(matches!(
            initialize_bot_detector(&NotificationBus::new(), BotDetectorOptions::default()),
            Err(ObserverError::NoRuntime(_))
        ));
    }

    #[test]
    fn test_metrics_handle_exposes_relay() {
        let bus = NotificationBus::new();
        let mut rx = bus.subscribe();
        let handle = initialize_metrics_tracker(&bus, MetricsOptions::default());

        let relay = handle.instance().unwrap();
        assert!(relay.track("fcp", json!(42)));
        assert_eq!(rx.drain().len(), 1);

        assert!(handle.destroy());
        assert!(!handle.destroy());
        assert!(!relay.track("fcp", json!(43)));
    }
}
