//! Ready-made guards and policies.

use std::sync::Arc;

use zhorn_events::NotificationBus;
use zhorn_interceptor::{Guard, HostSinks, PolicyConfig};

use crate::mocks::{MockDocument, MockImageFactory, RecordingBeacon, RecordingRequester};

/// Destinations allowed by [`test_policy_config`]. Under the default
/// substring rule an entry must contain the full `origin + path`.
pub const TEST_WHITELIST: [&str; 3] = [
    "https://api.example.com/collect",
    "https://cdn.example.com/assets/app.js",
    "https://apis.google-analytics.com/collect",
];

/// Policy over [`TEST_WHITELIST`] with the default substring rule.
#[must_use]
pub fn test_policy_config() -> PolicyConfig {
    PolicyConfig::new(TEST_WHITELIST)
}

/// The recording natives behind a test guard.
#[derive(Debug, Clone)]
pub struct TestHost {
    /// Beacon native.
    pub beacon: Arc<RecordingBeacon>,
    /// Request native for `XMLHttpRequest.send` and `fetch`.
    pub requests: Arc<RecordingRequester>,
    /// Image factory.
    pub images: Arc<MockImageFactory>,
    /// Document used for the shim detection.
    pub document: Arc<MockDocument>,
    /// Bus the guard publishes on.
    pub notifications: NotificationBus,
}

impl TestHost {
    fn with_document(document: Arc<MockDocument>) -> Self {
        Self {
            beacon: RecordingBeacon::new(),
            requests: RecordingRequester::new(),
            images: MockImageFactory::new(),
            document,
            notifications: NotificationBus::new(),
        }
    }

    fn sinks(&self) -> HostSinks {
        HostSinks::new()
            .with_beacon(self.beacon.clone())
            .with_requests(self.requests.clone())
            .with_images(self.images.clone())
            .with_document(self.document.clone())
    }

    fn guard(&self) -> Guard {
        Guard::builder()
            .host(self.sinks())
            .notifications(self.notifications.clone())
            .build()
    }
}

/// Guard on a modern host with every sink recorded. Not yet activated.
#[must_use]
pub fn test_guard() -> (Guard, TestHost) {
    let host = TestHost::with_document(MockDocument::modern());
    (host.guard(), host)
}

/// Guard on a legacy host with broken attribute notifications, so attribute
/// mutations go through the shim. Not yet activated.
#[must_use]
pub fn test_shimmed_guard() -> (Guard, TestHost) {
    let host = TestHost::with_document(MockDocument::legacy_broken());
    (host.guard(), host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zhorn_core::SinkCategory;
    use zhorn_interceptor::ShimMode;

    fn attribute_shim(guard: &Guard) -> Option<ShimMode> {
        guard
            .registry()
            .record(SinkCategory::AttributeInclusion)
            .map(|record| record.shim())
    }

    #[test]
    fn test_guard_fixture_installs_all_sinks() {
        let (guard, _host) = test_guard();
        for category in SinkCategory::ALL {
            assert!(guard.registry().is_installed(category));
        }
        assert!(!guard.is_active());
    }

    #[test]
    fn test_shimmed_fixture_detects_shimmed() {
        let (guard, _) = test_shimmed_guard();
        assert_eq!(attribute_shim(&guard), Some(ShimMode::Shimmed));
        let (guard, _) = test_guard();
        assert_eq!(attribute_shim(&guard), Some(ShimMode::Native));
    }

    #[test]
    fn test_policy_fixture() {
        assert_eq!(test_policy_config().whitelist().len(), TEST_WHITELIST.len());
    }
}
