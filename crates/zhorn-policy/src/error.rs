use thiserror::Error;

/// Errors raised while evaluating a destination against policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The destination could not be parsed as a URL.
    #[error("destination '{destination}' is not a valid URL: {reason}")]
    InvalidDestination {
        /// The raw destination.
        destination: String,
        /// Parser message.
        reason: String,
    },

    /// The destination has no tuple origin (e.g. `data:` or `about:` URLs).
    #[error("destination '{0}' has an opaque origin")]
    OpaqueOrigin(String),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
