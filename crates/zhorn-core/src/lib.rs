//! Zhorn Core - shared types for the sink interception engine.
//!
//! This crate provides:
//! - [`Intent`]: the cancellable description of a pending sink invocation
//! - [`SinkName`] / [`SinkCategory`]: the catalogue of guarded sinks
//! - [`GuardError`] / [`BlockedCall`]: the single fail-closed error shape
//!
//! Nothing here performs policy decisions. The bus lives in `zhorn-events`,
//! the whitelist and adapters in `zhorn-policy` and the engine itself in
//! `zhorn-interceptor`.
//!
//! # Example
//!
//! ```
//! use zhorn_core::{Intent, Method, OperationKind, SinkName};
//!
//! let intent = Intent::transmit(
//!     SinkName::SendBeacon,
//!     "https://a.example.com/collect",
//!     Method::Post,
//!     None,
//! );
//! assert_eq!(intent.kind(), OperationKind::Transmit);
//! assert!(!intent.is_vetoed());
//!
//! // The first veto wins; later ones are no-ops.
//! assert!(intent.cancel());
//! assert!(!intent.cancel());
//! assert!(intent.is_vetoed());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod intent;
pub mod sink;

pub use error::{BlockCause, BlockedCall, GuardError, GuardResult, HostError};
pub use intent::{Intent, IntentId, IntentSnapshot, Method, OperationKind};
pub use sink::{SinkCategory, SinkName};
