//! Prelude module - commonly used types for convenient import.
//!
//! Use `use zhorn_policy::prelude::*;` to import all essential types.

// Policy store
pub use crate::{MatchMode, PolicyStore, PolicyStoreBuilder};

// Validators
pub use crate::{ApproveAll, ValidationError, Validator};

// Adapters
pub use crate::{
    BLANK_DESTINATION, ContentSanitizer, ProfileSanitizer, SanitizeError, SchemeVetter, UrlVetter,
    VetOptions,
};

// Errors
pub use crate::{PolicyError, PolicyResult};
