//! Structural resolution of a destination into `origin` and `path`.

use url::Url;

use crate::error::{PolicyError, PolicyResult};

/// A destination resolved into the components the whitelist is matched on.
///
/// Query and fragment are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    origin: String,
    path: String,
}

impl Destination {
    /// Resolve a raw destination.
    ///
    /// Relative references are joined onto `base` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidDestination`] when the string does not
    /// parse (or is relative with no base), and [`PolicyError::OpaqueOrigin`]
    /// for URLs without a scheme/host/port origin.
    pub fn resolve(raw: &str, base: Option<&Url>) -> PolicyResult<Self> {
        let parsed = match base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        }
        .map_err(|e| PolicyError::InvalidDestination {
            destination: raw.to_string(),
            reason: e.to_string(),
        })?;

        let origin = parsed.origin();
        if !origin.is_tuple() {
            return Err(PolicyError::OpaqueOrigin(raw.to_string()));
        }

        Ok(Self {
            origin: origin.ascii_serialization(),
            path: parsed.path().to_string(),
        })
    }

    /// `scheme://host[:port]`, default ports omitted.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Path component, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The literal `origin + path` string the whitelist is matched against.
    #[must_use]
    pub fn origin_and_path(&self) -> String {
        format!("{}{}", self.origin, self.path)
    }

    /// Whether `other` lies under this destination.
    ///
    /// Origins must be equal. The path must equal this path or continue it
    /// past a `/` boundary, so `/api` covers `/api/v1` but not `/apiary`.
    /// Both comparisons are ASCII case-insensitive.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        if !self.origin.eq_ignore_ascii_case(&other.origin) {
            return false;
        }
        let anchor = self.path.as_bytes();
        let path = other.path.as_bytes();
        if path.len() < anchor.len() || !path[..anchor.len()].eq_ignore_ascii_case(anchor) {
            return false;
        }
        anchor.ends_with(b"/") || path.len() == anchor.len() || path[anchor.len()] == b'/'
    }
}
