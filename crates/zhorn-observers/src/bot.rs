//! Passive bot detector.
//!
//! Each selected test watches for one kind of human interaction. The host
//! feeds raw [`Signal`]s through [`BotDetector::record`]; once a test has
//! observed human activity it stops listening. When the observation window
//! closes with no test satisfied, the session is classified as bot-like and
//! a [`Notification::BotActivity`] is published.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use zhorn_events::{Notification, NotificationBus, NotificationMetadata};

use crate::error::ObserverError;

/// Default observation window.
pub const DEFAULT_BOT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Android rotation deltas at or below this are treated as sensor noise.
const ANDROID_MOTION_THRESHOLD: f64 = 0.2;

// ---------------------------------------------------------------------------
// Tests and signals
// ---------------------------------------------------------------------------

/// A selectable detection test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BotTest {
    /// Page or document scroll.
    Scroll,
    /// Pointer movement.
    MouseMove,
    /// Key release.
    KeyUp,
    /// Touch start.
    Swipe,
    /// Device rotation that actually moved.
    DeviceMotion,
    /// Device orientation change.
    DeviceOrientation,
    /// Legacy Gecko orientation event.
    MozOrientation,
}

impl BotTest {
    /// Every test, in detection order.
    pub const ALL: [Self; 7] = [
        Self::Scroll,
        Self::MouseMove,
        Self::KeyUp,
        Self::Swipe,
        Self::DeviceMotion,
        Self::DeviceOrientation,
        Self::MozOrientation,
    ];

    /// Name used to select the test.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scroll => "scroll",
            Self::MouseMove => "mousemove",
            Self::KeyUp => "keyup",
            Self::Swipe => "swipe",
            Self::DeviceMotion => "devicemotion",
            Self::DeviceOrientation => "deviceorientation",
            Self::MozOrientation => "MozOrientation",
        }
    }

    /// Key of the test in the reported cases. Swipe is reported under the
    /// event it listens for.
    #[must_use]
    pub const fn case_key(self) -> &'static str {
        match self {
            Self::Swipe => "touchstart",
            other => other.name(),
        }
    }
}

impl fmt::Display for BotTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BotTest {
    type Err = ObserverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| ObserverError::UnknownBotTest(s.to_owned()))
    }
}

/// Device rotation rate in degrees per second. Absent axes read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationRate {
    /// Rotation around the z axis.
    pub alpha: Option<f64>,
    /// Rotation around the x axis.
    pub beta: Option<f64>,
    /// Rotation around the y axis.
    pub gamma: Option<f64>,
}

impl RotationRate {
    /// Rate with all three axes present.
    #[must_use]
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }

    fn has_rotation(&self) -> bool {
        [self.alpha, self.beta, self.gamma]
            .into_iter()
            .flatten()
            .any(|v| v != 0.0 && !v.is_nan())
    }
}

/// A raw interaction event reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    /// `scroll` on the window or document.
    Scroll,
    /// `mousemove` on the window.
    MouseMove,
    /// `keyup` on the window.
    KeyUp,
    /// `touchstart` on the document.
    TouchStart,
    /// `devicemotion` with its rotation rate.
    DeviceMotion(RotationRate),
    /// `deviceorientation` on the window.
    DeviceOrientation,
    /// `MozOrientation` on the window.
    MozOrientation,
}

impl Signal {
    /// Test this signal feeds.
    #[must_use]
    pub const fn test(&self) -> BotTest {
        match self {
            Self::Scroll => BotTest::Scroll,
            Self::MouseMove => BotTest::MouseMove,
            Self::KeyUp => BotTest::KeyUp,
            Self::TouchStart => BotTest::Swipe,
            Self::DeviceMotion(_) => BotTest::DeviceMotion,
            Self::DeviceOrientation => BotTest::DeviceOrientation,
            Self::MozOrientation => BotTest::MozOrientation,
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Detector settings.
#[derive(Debug, Clone)]
pub struct BotDetectorOptions {
    /// Observation window.
    pub timeout: Duration,
    /// Selected tests; empty selects all.
    pub tests: Vec<BotTest>,
    /// Compare raw rotation values instead of values rounded to tens.
    pub android: bool,
}

impl Default for BotDetectorOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BOT_TIMEOUT,
            tests: Vec::new(),
            android: false,
        }
    }
}

impl BotDetectorOptions {
    /// Set the observation window.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Select tests.
    #[must_use]
    pub fn with_tests(mut self, tests: impl IntoIterator<Item = BotTest>) -> Self {
        self.tests = tests.into_iter().collect();
        self
    }

    /// Treat the device as Android with touch support.
    #[must_use]
    pub fn android(mut self) -> Self {
        self.android = true;
        self
    }
}

/// Classification at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotVerdict {
    /// No selected test observed human activity.
    pub is_bot: bool,
    /// Every selected test observed human activity.
    pub all_matched: bool,
    /// Per-test outcome keyed by [`BotTest::case_key`].
    pub cases: BTreeMap<String, bool>,
}

#[derive(Debug, Default)]
struct DetectorState {
    observed: BTreeMap<BotTest, bool>,
    last_rotation: Option<(f64, f64)>,
}

/// Passive classifier of the current session.
#[derive(Debug)]
pub struct BotDetector {
    options: BotDetectorOptions,
    state: Mutex<DetectorState>,
    bus: NotificationBus,
}

impl BotDetector {
    /// Detector publishing to `bus`.
    #[must_use]
    pub fn new(bus: NotificationBus, options: BotDetectorOptions) -> Self {
        let selected: Vec<BotTest> = if options.tests.is_empty() {
            BotTest::ALL.to_vec()
        } else {
            options.tests.clone()
        };
        let state = DetectorState {
            observed: selected.into_iter().map(|t| (t, false)).collect(),
            last_rotation: None,
        };
        Self {
            options,
            state: Mutex::new(state),
            bus,
        }
    }

    /// Observation window.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }

    /// Selected tests, in detection order.
    #[must_use]
    pub fn selected(&self) -> Vec<BotTest> {
        self.lock().observed.keys().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DetectorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Feed a signal. Returns whether its test has now observed human
    /// activity. Signals for unselected tests are ignored.
    pub fn record(&self, signal: &Signal) -> bool {
        let test = signal.test();
        let mut state = self.lock();
        match state.observed.get(&test) {
            None => return false,
            Some(true) => return true,
            Some(false) => {},
        }

        let human = match signal {
            Signal::DeviceMotion(rate) => self.device_motion(&mut state, rate),
            _ => true,
        };
        state.observed.insert(test, human);
        trace!(test = %test, human, "Bot detector signal");
        human
    }

    fn device_motion(&self, state: &mut DetectorState, rate: &RotationRate) -> bool {
        if !rate.has_rotation() {
            return false;
        }
        let beta = rate.beta.unwrap_or(0.0);
        let gamma = rate.gamma.unwrap_or(0.0);
        let (beta, gamma) = if self.options.android {
            (beta, gamma)
        } else {
            (round_to_tens(beta), round_to_tens(gamma))
        };

        let Some((last_beta, last_gamma)) = state.last_rotation else {
            state.last_rotation = Some((beta, gamma));
            return false;
        };
        let moved = differs(beta, last_beta) || differs(gamma, last_gamma);
        if self.options.android {
            moved && (beta > ANDROID_MOTION_THRESHOLD || gamma > ANDROID_MOTION_THRESHOLD)
        } else {
            moved
        }
    }

    /// Current classification.
    #[must_use]
    pub fn update(&self) -> BotVerdict {
        let state = self.lock();
        let total = state.observed.len();
        let matched = state.observed.values().filter(|v| **v).count();
        BotVerdict {
            is_bot: matched == 0,
            all_matched: matched == total,
            cases: state
                .observed
                .iter()
                .map(|(test, seen)| (test.case_key().to_owned(), *seen))
                .collect(),
        }
    }

    /// Wait out the observation window, then classify. Publishes
    /// [`Notification::BotActivity`] when the session looks like a bot.
    /// Returns `None` if `cancel` fires first.
    pub async fn monitor(&self, cancel: &CancellationToken) -> Option<BotVerdict> {
        let initial = self.update();
        debug!(tests = initial.cases.len(), timeout_ms = ?self.options.timeout.as_millis(), "Bot detector monitoring");

        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Bot detector cancelled before the window closed");
                None
            },
            () = tokio::time::sleep(self.options.timeout) => {
                let verdict = self.update();
                if verdict.is_bot {
                    info!(cases = ?verdict.cases, "No human activity observed");
                    self.bus.publish(Notification::BotActivity {
                        metadata: NotificationMetadata::new("bot_detector"),
                        captured: verdict.is_bot,
                        cases: verdict.cases.clone(),
                    });
                }
                Some(verdict)
            },
        }
    }
}

fn round_to_tens(value: f64) -> f64 {
    (value / 10.0).round() * 10.0
}

fn differs(a: f64, b: f64) -> bool {
    (a - b).abs() > f64::EPSILON
}
