//! Custom validator hook run after a whitelist match.

use thiserror::Error;
use zhorn_core::IntentSnapshot;

use crate::vetting::UrlVetter;

/// Rejection raised by a [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    /// Create a rejection with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Rejection message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// User-supplied check on whitelisted intents.
///
/// Returning an error (or panicking) vetoes the intent.
pub trait Validator: Send + Sync {
    /// Validate an intent that already matched the whitelist.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] to veto.
    fn validate(&self, vetter: &dyn UrlVetter, intent: &IntentSnapshot)
    -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&dyn UrlVetter, &IntentSnapshot) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(
        &self,
        vetter: &dyn UrlVetter,
        intent: &IntentSnapshot,
    ) -> Result<(), ValidationError> {
        self(vetter, intent)
    }
}

/// Validator that accepts everything; the default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl Validator for ApproveAll {
    fn validate(&self, _: &dyn UrlVetter, _: &IntentSnapshot) -> Result<(), ValidationError> {
        Ok(())
    }
}
