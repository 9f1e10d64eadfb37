//! Environment variable fallbacks.
//!
//! A variable only fills a field that no file layer has set, so an explicit
//! setting in a config file always wins.

use std::collections::HashMap;

use crate::merge::{ConfigLayer, FieldSources};

/// Variable to field mapping.
pub const ENV_FALLBACKS: [(&str, &str, &str); 2] = [
    ("ZHORN_LOG_LEVEL", "logging", "level"),
    ("ZHORN_LOG_FORMAT", "logging", "format"),
];

/// Snapshot of the `ZHORN_*` variables in the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("ZHORN_"))
        .collect()
}

/// Apply fallbacks from `env` to fields still at their default. Returns the
/// number of fields set.
pub fn apply_env_fallbacks(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env: &HashMap<String, String>,
) -> usize {
    let mut applied = 0usize;
    for (var, section, field) in ENV_FALLBACKS {
        let Some(value) = env.get(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let path = format!("{section}.{field}");
        if sources
            .get(&path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }
        let Some(table) = merged.as_table_mut() else {
            continue;
        };
        let section_table = table
            .entry(section)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        if let Some(section_table) = section_table.as_table_mut() {
            section_table.insert(field.to_owned(), toml::Value::String(value.trim().to_owned()));
            sources.insert(path, ConfigLayer::Environment);
            applied = applied.saturating_add(1);
        }
    }
    applied
}
