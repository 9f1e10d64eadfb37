//! Configuration types.
//!
//! These types mirror the engine's settings without depending on any other
//! zhorn crate; the CLI converts them at startup. Every section implements
//! [`Default`] so a bare `[section]` header yields a working configuration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whitelist policy applied to guarded calls.
    pub policy: PolicySection,
    /// Options passed to the URL vetter.
    pub vetting: VettingSection,
    /// Bot detector settings.
    pub bot_detector: BotDetectorSection,
    /// Performance metrics relay settings.
    pub metrics: MetricsSection,
    /// Log output.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// `[policy]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Allowed destination fragments.
    pub whitelist: Vec<String>,
    /// `substring`, `prefix` or `exact`.
    pub match_mode: String,
    /// Base for resolving relative destinations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Attributes whose `setAttribute` calls are vetted.
    pub guarded_attributes: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            match_mode: "substring".to_owned(),
            base_url: None,
            guarded_attributes: vec!["href".to_owned(), "src".to_owned()],
        }
    }
}

/// Accepted values for `policy.match_mode`.
pub const MATCH_MODES: [&str; 3] = ["substring", "prefix", "exact"];

// ---------------------------------------------------------------------------
// Vetting
// ---------------------------------------------------------------------------

/// `[vetting]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VettingSection {
    /// Treat `ws:` and `wss:` as safe.
    pub allow_web_transport_uri: bool,
    /// Treat `javascript:`, `data:` and `blob:` as safe.
    pub allow_script_or_data_uri: bool,
}

impl Default for VettingSection {
    fn default() -> Self {
        Self {
            allow_web_transport_uri: true,
            allow_script_or_data_uri: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// `[bot_detector]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotDetectorSection {
    /// Start the detector with the guard.
    pub enabled: bool,
    /// Observation window.
    pub timeout_ms: u64,
    /// Selected tests; empty selects all.
    pub tests: Vec<String>,
}

impl Default for BotDetectorSection {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 1000,
            tests: Vec::new(),
        }
    }
}

/// Test names accepted in `bot_detector.tests`.
pub const BOT_TESTS: [&str; 7] = [
    "scroll",
    "mousemove",
    "keyup",
    "swipe",
    "devicemotion",
    "deviceorientation",
    "MozOrientation",
];

/// `[metrics]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Start the relay with the guard.
    pub enabled: bool,
    /// Measurements after this many milliseconds are dropped.
    pub max_measure_time_ms: u64,
    /// Relay resource timing entries.
    pub resource_timing: bool,
    /// Relay element timing entries.
    pub element_timing: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_measure_time_ms: 15_000,
            resource_timing: false,
            element_timing: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Extra filter directives.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}

/// Accepted values for `logging.format`.
pub const LOG_FORMATS: [&str; 4] = ["pretty", "compact", "json", "full"];
