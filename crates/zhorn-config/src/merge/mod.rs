//! Layered merging with per-field provenance.

mod deep;

pub use deep::{deep_merge, deep_merge_tracking, record_leaves};

use std::collections::BTreeMap;
use std::fmt;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// `~/.zhorn/config.toml` or `$ZHORN_HOME/config.toml`.
    User,
    /// `{workspace}/.zhorn/config.toml`.
    Workspace,
    /// An environment variable fallback.
    Environment,
    /// A single file passed explicitly.
    File(String),
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::User => write!(f, "user (~/.zhorn/config.toml)"),
            Self::Workspace => write!(f, "workspace (.zhorn/config.toml)"),
            Self::Environment => write!(f, "environment variable"),
            Self::File(path) => write!(f, "file ({path})"),
        }
    }
}

/// Dotted field path to the layer that last set it.
pub type FieldSources = BTreeMap<String, ConfigLayer>;
