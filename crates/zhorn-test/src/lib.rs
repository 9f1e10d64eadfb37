//! Zhorn Test - shared mocks and fixtures.
//!
//! Use as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! zhorn-test.workspace = true
//! ```
//!
//! ```rust
//! use zhorn_test::{EventLog, test_guard, test_policy_config};
//!
//! let (guard, host) = test_guard();
//! let log = EventLog::attach(&host.notifications);
//! let _handle = guard.activate(test_policy_config());
//!
//! guard.send_beacon("https://api.example.com/collect", None).unwrap();
//! assert_eq!(host.beacon.call_count(), 1);
//! assert_eq!(log.event_types(), vec!["beforerequest"]);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
