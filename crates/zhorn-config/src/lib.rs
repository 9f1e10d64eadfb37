#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Layered configuration for zhorn.
//!
//! ```rust,no_run
//! use zhorn_config::Config;
//!
//! let resolved = Config::load(Some(std::path::Path::new("."))).unwrap();
//! println!("match mode: {}", resolved.config.policy.match_mode);
//! ```
//!
//! # Precedence
//!
//! Highest first:
//!
//! 1. Workspace (`{workspace}/.zhorn/config.toml`)
//! 2. User (`~/.zhorn/config.toml`, else `$ZHORN_HOME/config.toml`)
//! 3. Environment (`ZHORN_LOG_LEVEL`, `ZHORN_LOG_FORMAT`), only for fields no
//!    file sets
//! 4. Embedded defaults
//!
//! This crate depends on no other zhorn crate. The CLI converts these types
//! into engine types at startup.

pub mod prelude;

/// Environment variable fallbacks.
pub mod env;
/// Error types.
pub mod error;
/// File discovery and loading.
pub mod loader;
/// Layered merging.
pub mod merge;
/// Resolved configuration and rendering.
pub mod show;
/// Configuration structs.
pub mod types;
/// Validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

use std::path::Path;

impl Config {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or validation fails.
    pub fn load(workspace_root: Option<&Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_root, None)
    }

    /// Load with `home_dir` as the user config directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or validation fails.
    pub fn load_with_home(
        workspace_root: Option<&Path>,
        home_dir: &Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_root, Some(home_dir))
    }

    /// Load a single file, no layering.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed or
    /// validated.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
