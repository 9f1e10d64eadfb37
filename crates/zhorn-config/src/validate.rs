//! Validation of a merged configuration.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{BOT_TESTS, Config, LOG_FORMATS, MATCH_MODES};

const MAX_TIMEOUT_MS: u64 = 60_000;
const MAX_MEASURE_TIME_MS: u64 = 600_000;

/// Validate every section. Stops at the first invalid field.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_policy(config)?;
    validate_bot_detector(config)?;
    validate_metrics(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_policy(config: &Config) -> ConfigResult<()> {
    let policy = &config.policy;
    if let Some(index) = policy.whitelist.iter().position(|e| e.trim().is_empty()) {
        return Err(invalid(
            &format!("policy.whitelist[{index}]"),
            "entries must not be empty",
        ));
    }
    if !MATCH_MODES.contains(&policy.match_mode.as_str()) {
        return Err(invalid(
            "policy.match_mode",
            format!("expected one of {}, got '{}'", MATCH_MODES.join(", "), policy.match_mode),
        ));
    }
    if let Some(base) = &policy.base_url {
        match url::Url::parse(base) {
            Ok(parsed) if !parsed.cannot_be_a_base() => {},
            Ok(_) => return Err(invalid("policy.base_url", "must be a hierarchical URL")),
            Err(e) => return Err(invalid("policy.base_url", format!("not an absolute URL: {e}"))),
        }
    }
    if policy.guarded_attributes.iter().any(|a| a.trim().is_empty()) {
        return Err(invalid(
            "policy.guarded_attributes",
            "attribute names must not be empty",
        ));
    }
    Ok(())
}

fn validate_bot_detector(config: &Config) -> ConfigResult<()> {
    let bot = &config.bot_detector;
    if !(1..=MAX_TIMEOUT_MS).contains(&bot.timeout_ms) {
        return Err(invalid(
            "bot_detector.timeout_ms",
            format!("must be between 1 and {MAX_TIMEOUT_MS}"),
        ));
    }
    if let Some(unknown) = bot.tests.iter().find(|t| !BOT_TESTS.contains(&t.as_str())) {
        return Err(invalid(
            "bot_detector.tests",
            format!("unknown test '{unknown}'"),
        ));
    }
    Ok(())
}

fn validate_metrics(config: &Config) -> ConfigResult<()> {
    if !(1..=MAX_MEASURE_TIME_MS).contains(&config.metrics.max_measure_time_ms) {
        return Err(invalid(
            "metrics.max_measure_time_ms",
            format!("must be between 1 and {MAX_MEASURE_TIME_MS}"),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let format = config.logging.format.to_ascii_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!("expected one of {}, got '{}'", LOG_FORMATS.join(", "), config.logging.format),
        ));
    }
    if config.logging.level.trim().is_empty() {
        return Err(invalid("logging.level", "must not be empty"));
    }
    Ok(())
}
