//! Whitelist policy store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use url::Url;

use zhorn_core::IntentSnapshot;

use crate::destination::Destination;
use crate::error::PolicyResult;
use crate::validator::{ApproveAll, ValidationError, Validator};
use crate::vetting::UrlVetter;

/// How a whitelist entry is compared against a destination's `origin + path`.
///
/// Comparison is always ASCII case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The entry contains the destination's `origin + path`.
    #[default]
    Substring,
    /// The destination has the entry's origin and its path lies under the
    /// entry's path on a `/` boundary.
    Prefix,
    /// The entry equals the destination's `origin + path`.
    Exact,
}

impl MatchMode {
    fn matches(self, entry: &str, candidate: &str) -> bool {
        match self {
            Self::Substring => entry.contains(candidate),
            // Prefix entries are resolved at build time and go through
            // `Destination::covers`; never compare raw strings for them.
            Self::Prefix => false,
            Self::Exact => entry == candidate,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Substring => write!(f, "substring"),
            Self::Prefix => write!(f, "prefix"),
            Self::Exact => write!(f, "exact"),
        }
    }
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substring" => Ok(Self::Substring),
            "prefix" => Ok(Self::Prefix),
            "exact" => Ok(Self::Exact),
            other => Err(format!("unknown match mode: {other}")),
        }
    }
}

/// Active policy: allowed destinations plus a validator.
///
/// Immutable once built; shared behind an `Arc` by the guard.
pub struct PolicyStore {
    whitelist: Vec<String>,
    folded: Vec<String>,
    anchors: Vec<Destination>,
    match_mode: MatchMode,
    base_url: Option<Url>,
    validator: Arc<dyn Validator>,
}

impl fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStore")
            .field("whitelist", &self.whitelist)
            .field("match_mode", &self.match_mode)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

impl PolicyStore {
    /// Start building a store.
    #[must_use]
    pub fn builder() -> PolicyStoreBuilder {
        PolicyStoreBuilder::default()
    }

    /// Configured entries, in configuration order.
    #[must_use]
    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    /// Matching mode.
    #[must_use]
    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    /// Base URL relative destinations are resolved against.
    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Whether a destination matches some whitelist entry.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`](crate::PolicyError) when the destination
    /// cannot be resolved to a tuple origin. Callers treat this as a veto.
    pub fn is_allowed(&self, destination: &str) -> PolicyResult<bool> {
        let resolved = Destination::resolve(destination, self.base_url.as_ref())?;
        let candidate = resolved.origin_and_path().to_ascii_lowercase();

        let allowed = match self.match_mode {
            MatchMode::Prefix => self.anchors.iter().any(|anchor| anchor.covers(&resolved)),
            mode => self.folded.iter().any(|entry| mode.matches(entry, &candidate)),
        };

        trace!(
            destination,
            candidate = %candidate,
            match_mode = %self.match_mode,
            allowed,
            "Whitelist evaluated"
        );
        Ok(allowed)
    }

    /// Run the configured validator.
    ///
    /// # Errors
    ///
    /// Propagates the validator's rejection.
    pub fn validate(
        &self,
        vetter: &dyn UrlVetter,
        intent: &IntentSnapshot,
    ) -> Result<(), ValidationError> {
        self.validator.validate(vetter, intent)
    }
}

/// Builder for [`PolicyStore`].
#[derive(Default)]
pub struct PolicyStoreBuilder {
    whitelist: Vec<String>,
    match_mode: MatchMode,
    base_url: Option<Url>,
    validator: Option<Arc<dyn Validator>>,
}

impl PolicyStoreBuilder {
    /// Add one allowed destination.
    #[must_use]
    pub fn allow(mut self, entry: impl Into<String>) -> Self {
        self.whitelist.push(entry.into());
        self
    }

    /// Add several allowed destinations.
    #[must_use]
    pub fn allow_all<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist.extend(entries.into_iter().map(Into::into));
        self
    }

    /// Set the matching mode.
    #[must_use]
    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Set the base URL used to resolve relative destinations.
    #[must_use]
    pub fn base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// Set the validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Build the store. Without a validator, [`ApproveAll`] is used.
    #[must_use]
    pub fn build(self) -> PolicyStore {
        let folded = self
            .whitelist
            .iter()
            .map(|e| e.trim().to_ascii_lowercase())
            .collect();
        let anchors = if self.match_mode == MatchMode::Prefix {
            self.resolve_anchors()
        } else {
            Vec::new()
        };
        debug!(
            entries = self.whitelist.len(),
            match_mode = %self.match_mode,
            custom_validator = self.validator.is_some(),
            "Policy store built"
        );
        PolicyStore {
            whitelist: self.whitelist,
            folded,
            anchors,
            match_mode: self.match_mode,
            base_url: self.base_url,
            validator: self.validator.unwrap_or_else(|| Arc::new(ApproveAll)),
        }
    }

    /// Resolve prefix entries. An entry that does not resolve to a tuple
    /// origin matches nothing.
    fn resolve_anchors(&self) -> Vec<Destination> {
        self.whitelist
            .iter()
            .filter_map(
                |entry| match Destination::resolve(entry.trim(), self.base_url.as_ref()) {
                    Ok(anchor) => Some(anchor),
                    Err(e) => {
                        warn!(entry = %entry, error = %e, "Prefix entry ignored");
                        None
                    },
                },
            )
            .collect()
    }
}
