//! Config commands: show and validate the resolved configuration.

use std::path::Path;

use anyhow::Result;
use zhorn_config::{Config, ResolvedConfig, ShowFormat};

use crate::config_bridge;
use crate::theme::Theme;

/// Load from `path` alone, or through the full precedence chain.
pub(crate) fn resolve(path: Option<&Path>) -> Result<ResolvedConfig> {
    match path {
        Some(path) => {
            let config = Config::load_file(path)?;
            Ok(ResolvedConfig {
                config,
                field_sources: zhorn_config::merge::FieldSources::new(),
                loaded_files: vec![path.display().to_string()],
            })
        },
        None => {
            let workspace = std::env::current_dir().ok();
            Ok(Config::load(workspace.as_deref())?)
        },
    }
}

/// Print the resolved configuration.
pub(crate) fn show_config(path: Option<&Path>, format: ShowFormat) -> Result<()> {
    let resolved = resolve(path)?;
    if format == ShowFormat::Toml {
        for file in &resolved.loaded_files {
            println!("# loaded: {file}");
        }
    }
    println!("{}", resolved.render(format)?);
    Ok(())
}

/// Check that the configuration loads and converts into engine settings.
pub(crate) fn validate_config(path: Option<&Path>) -> Result<()> {
    let resolved = resolve(path)?;
    let cfg = &resolved.config;
    config_bridge::to_policy_config(cfg)?;
    config_bridge::to_bot_detector_options(cfg)?;
    let metrics = config_bridge::to_metrics_options(cfg);
    let log = config_bridge::to_log_config(cfg);

    println!("{}", Theme::success("Configuration is valid"));
    println!("  Whitelist entries: {}", cfg.policy.whitelist.len());
    println!("  Match mode:        {}", cfg.policy.match_mode);
    println!("  Bot detector:      {}", enabled(cfg.bot_detector.enabled));
    println!(
        "  Metrics:           {} (cut-off {} ms)",
        enabled(cfg.metrics.enabled),
        metrics.max_measure_time.as_millis()
    );
    println!("  Log level:         {}", log.level);
    if resolved.loaded_files.is_empty() {
        println!("  {}", Theme::dimmed("No config files found, using defaults"));
    }
    for file in &resolved.loaded_files {
        println!("  {}", Theme::dimmed(&format!("loaded {file}")));
    }
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag { "enabled" } else { "disabled" }
}
