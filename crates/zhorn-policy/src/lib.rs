//! Zhorn Policy - whitelist store and the two pluggable adapters.
//!
//! - [`PolicyStore`]: allowed destinations plus a custom [`Validator`]
//! - [`UrlVetter`]: fast structural classification of destinations
//!   ([`SchemeVetter`] is the built-in implementation)
//! - [`ContentSanitizer`]: certification of `(tag, attribute, value)`
//!   triples on the include path and cleaning of markup fragments
//!   ([`ProfileSanitizer`] carries the fixed profile)
//!
//! # Example
//!
//! ```
//! use zhorn_policy::{MatchMode, PolicyStore};
//!
//! let store = PolicyStore::builder()
//!     .allow("https://a.example.com/collect")
//!     .match_mode(MatchMode::Substring)
//!     .build();
//!
//! assert!(store.is_allowed("https://A.example.com/collect?x=1").unwrap());
//! assert!(!store.is_allowed("https://evil.example.com/x").unwrap());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod destination;
/// Error types for policy evaluation.
pub mod error;
pub mod markup;
pub mod sanitizer;
pub mod store;
pub mod validator;
pub mod vetting;

pub use destination::Destination;
pub use error::{PolicyError, PolicyResult};
pub use markup::{MarkupResource, markup_resources};
pub use sanitizer::{ContentSanitizer, ProfileSanitizer, SanitizeError, SanitizerProfile};
pub use store::{MatchMode, PolicyStore, PolicyStoreBuilder};
pub use validator::{ApproveAll, ValidationError, Validator};
pub use vetting::{BLANK_DESTINATION, SchemeVetter, UrlVetter, VetOptions};
