//! Observer errors.

/// Errors raised while configuring or starting an observer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// A bot test name is not recognised.
    #[error("unknown bot test: {0}")]
    UnknownBotTest(String),

    /// The detector needs a Tokio runtime to run its observation window.
    #[error("no tokio runtime available to run the {0}")]
    NoRuntime(&'static str),
}

/// Result alias for observer operations.
pub type ObserverResult<T> = Result<T, ObserverError>;
