//! Common imports for configuration consumers.
//!
//! ```
//! use zhorn_config::prelude::*;
//! ```

pub use crate::{
    BotDetectorSection, Config, ConfigError, ConfigLayer, ConfigResult, LoggingSection,
    MetricsSection, PolicySection, ResolvedConfig, ShowFormat, VettingSection,
};
