//! Everything a test usually needs.
//!
//! ```
//! use zhorn_test::prelude::*;
//! ```

pub use crate::fixtures::{TestHost, test_guard, test_policy_config, test_shimmed_guard};
pub use crate::harness::setup_test_logging;
pub use crate::mocks::{
    EventLog, MockDocument, MockElement, MockImage, MockImageFactory, RecordingBeacon,
    RecordingRequester, SpyOutcome, SpyValidator,
};
