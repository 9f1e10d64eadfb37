//! Prelude module - commonly used types for convenient import.
//!
//! Use `use zhorn_core::prelude::*;` to import all essential types.

// Intents
pub use crate::{Intent, IntentId, IntentSnapshot, Method, OperationKind};

// Sinks
pub use crate::{SinkCategory, SinkName};

// Errors
pub use crate::{BlockCause, BlockedCall, GuardError, GuardResult, HostError};
