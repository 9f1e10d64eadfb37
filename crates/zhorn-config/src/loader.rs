//! Config file discovery and layered loading.
//!
//! `load` runs these steps in order:
//! 1. Parse the embedded `defaults.toml`.
//! 2. Merge `~/.zhorn/config.toml`, or `$ZHORN_HOME/config.toml` when the
//!    former is absent.
//! 3. Merge `{workspace}/.zhorn/config.toml`.
//! 4. Apply environment fallbacks to fields no file set.
//! 5. Deserialize and validate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Largest config file accepted (1 MiB).
pub const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Directory name under the home and workspace roots.
const CONFIG_DIR: &str = ".zhorn";
const CONFIG_FILE: &str = "config.toml";

/// Load the layered configuration.
///
/// `workspace_root` enables the workspace layer. `home_override` names the
/// user config directory directly (the directory holding `config.toml`),
/// bypassing home discovery and `ZHORN_HOME`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable, oversized or malformed,
/// or if the merged configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    load_with_env(workspace_root, home_override, &collect_env_vars())
}

pub(crate) fn load_with_env(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
    env: &HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut sources);

    if let Some((overlay, path)) = user_config(home_override, env)? {
        deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::User, &mut sources);
        info!(path = %path.display(), "Loaded user config");
        loaded_files.push(path.display().to_string());
    }

    if let Some(root) = workspace_root {
        let path = root.join(CONFIG_DIR).join(CONFIG_FILE);
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::Workspace, &mut sources);
            info!(path = %path.display(), "Loaded workspace config");
            loaded_files.push(path.display().to_string());
        }
    }

    let applied = apply_env_fallbacks(&mut merged, &mut sources, env);
    if applied > 0 {
        debug!(count = applied, "Applied environment fallbacks");
    }

    let config: Config = merged.try_into().map_err(ConfigError::SchemaError)?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources: sources,
        loaded_files,
    })
}

fn user_config(
    home_override: Option<&Path>,
    env: &HashMap<String, String>,
) -> ConfigResult<Option<(toml::Value, PathBuf)>> {
    if let Some(dir) = home_override {
        let path = dir.join(CONFIG_FILE);
        return Ok(try_load_file(&path)?.map(|v| (v, path)));
    }

    let path = home_directory()?.join(CONFIG_DIR).join(CONFIG_FILE);
    if let Some(value) = try_load_file(&path)? {
        return Ok(Some((value, path)));
    }

    let Some(raw) = env.get("ZHORN_HOME") else {
        return Ok(None);
    };
    match PathBuf::from(raw).canonicalize() {
        Ok(dir) if dir.is_dir() => {
            let path = dir.join(CONFIG_FILE);
            Ok(try_load_file(&path)?.map(|v| (v, path)))
        },
        _ => {
            warn!(path = %raw, "ZHORN_HOME is not a directory; ignoring");
            Ok(None)
        },
    }
}

/// Load and validate a single file, with no layering or env fallbacks.
/// Fields absent from the file take their defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is missing, unreadable, oversized,
/// malformed, or fails validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let content = read_limited(path)?;
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Parse `path` as a TOML tree, or `None` when it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match read_limited(path) {
        Ok(content) => content,
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "Config file not found, skipping");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

/// Read a file, checking the size after the read so there is no window
/// between a stat and the read.
fn read_limited(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
    if size > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::FileTooLarge {
            path: path.display().to_string(),
            size,
            limit: MAX_CONFIG_FILE_SIZE,
        });
    }
    Ok(content)
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
