//! Conversion from `zhorn_config` types to engine types.

use anyhow::{Context, Result};
use std::time::Duration;
use url::Url;

use zhorn_config::Config;
use zhorn_interceptor::PolicyConfig;
use zhorn_observers::{BotDetectorOptions, BotTest, MetricsOptions};
use zhorn_policy::{MatchMode, VetOptions};
use zhorn_telemetry::{LogConfig, LogFormat};

/// Logging settings. Unknown formats fall back to compact.
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or(LogFormat::Compact);
    cfg.logging
        .directives
        .iter()
        .fold(LogConfig::new(&cfg.logging.level).with_format(format), |lc, d| {
            lc.with_directive(d)
        })
}

/// Policy to activate.
///
/// # Errors
///
/// Fails if the match mode or base URL does not parse.
pub fn to_policy_config(cfg: &Config) -> Result<PolicyConfig> {
    let mode: MatchMode = cfg
        .policy
        .match_mode
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("policy.match_mode")?;
    let mut policy = PolicyConfig::new(cfg.policy.whitelist.iter().cloned()).with_match_mode(mode);
    if let Some(base) = &cfg.policy.base_url {
        let base = Url::parse(base).with_context(|| format!("policy.base_url '{base}'"))?;
        policy = policy.with_base_url(base);
    }
    Ok(policy)
}

/// Vetting options.
pub fn to_vet_options(cfg: &Config) -> VetOptions {
    VetOptions {
        allow_web_transport_uri: cfg.vetting.allow_web_transport_uri,
        allow_script_or_data_uri: cfg.vetting.allow_script_or_data_uri,
    }
}

/// Bot detector options.
///
/// # Errors
///
/// Fails on an unknown test name.
pub fn to_bot_detector_options(cfg: &Config) -> Result<BotDetectorOptions> {
    let tests = cfg
        .bot_detector
        .tests
        .iter()
        .map(|t| t.parse::<BotTest>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BotDetectorOptions::default()
        .with_timeout(Duration::from_millis(cfg.bot_detector.timeout_ms))
        .with_tests(tests))
}

/// Metrics relay options.
pub fn to_metrics_options(cfg: &Config) -> MetricsOptions {
    MetricsOptions {
        max_measure_time: Duration::from_millis(cfg.metrics.max_measure_time_ms),
        resource_timing: cfg.metrics.resource_timing,
        element_timing: cfg.metrics.element_timing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_conversion() {
        let mut cfg = Config::default();
        cfg.policy.whitelist = vec!["https://api.example.com".into()];
        cfg.policy.match_mode = "prefix".into();
        cfg.policy.base_url = Some("https://app.example.com/".into());

        let policy = to_policy_config(&cfg).unwrap();
        assert_eq!(policy.whitelist(), ["https://api.example.com".to_string()]);
    }

    #[test]
    fn test_bad_match_mode_reports_field() {
        let mut cfg = Config::default();
        cfg.policy.match_mode = "glob".into();
        let err = to_policy_config(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("policy.match_mode"));
    }

    #[test]
    fn test_log_config_conversion() {
        let mut cfg = Config::default();
        cfg.logging.level = "debug".into();
        cfg.logging.format = "json".into();
        cfg.logging.directives = vec!["zhorn_interceptor=trace".into()];

        let lc = to_log_config(&cfg);
        assert_eq!(lc.level, "debug");
        assert_eq!(lc.format, LogFormat::Json);
        assert_eq!(lc.directives, vec!["zhorn_interceptor=trace".to_string()]);
    }

    #[test]
    fn test_vetting_conversion() {
        let mut cfg = Config::default();
        cfg.vetting.allow_script_or_data_uri = true;
        let options = to_vet_options(&cfg);
        assert!(options.allow_web_transport_uri);
        assert!(options.allow_script_or_data_uri);
    }

    #[test]
    fn test_observer_conversion() {
        let mut cfg = Config::default();
        cfg.bot_detector.tests = vec!["swipe".into(), "keyup".into()];
        cfg.bot_detector.timeout_ms = 1500;
        let bot = to_bot_detector_options(&cfg).unwrap();
        assert_eq!(bot.tests, vec![BotTest::Swipe, BotTest::KeyUp]);
        assert_eq!(bot.timeout, Duration::from_millis(1500));

        cfg.metrics.resource_timing = true;
        let metrics = to_metrics_options(&cfg);
        assert!(metrics.resource_timing);
        assert_eq!(metrics.max_measure_time, Duration::from_millis(15_000));
    }
}
