//! Zhorn Telemetry - logging setup and request correlation.
//!
//! # Example
//!
//! ```rust,no_run
//! use zhorn_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), zhorn_telemetry::TelemetryError> {
//! setup_logging(
//!     &LogConfig::new("info")
//!         .with_format(LogFormat::Compact)
//!         .with_directive("zhorn_interceptor=debug"),
//! )?;
//!
//! let ctx = RequestContext::new("zhorn-cli").with_operation("check");
//! let _entered = ctx.span().entered();
//! tracing::info!("Evaluating destination");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
