//! Error types for guarded sink calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::intent::{Intent, Method, OperationKind};
use crate::sink::SinkName;

/// Why a guarded call was blocked.
///
/// Recorded for logs and observer notifications only. Callers of a guarded
/// sink always see the same [`GuardError::Blocked`] shape regardless of cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCause {
    /// No whitelist match, validator rejection, or no active policy.
    PolicyVeto,
    /// The vetting adapter neutralized the destination before policy ran.
    VettingRejected,
    /// The sanitizer refused the value after policy approval.
    SanitizationRejected,
}

impl fmt::Display for BlockCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyVeto => write!(f, "policy veto"),
            Self::VettingRejected => write!(f, "vetting rejected"),
            Self::SanitizationRejected => write!(f, "sanitization rejected"),
        }
    }
}

/// Diagnostic carried by a blocked call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedCall {
    /// The destination that was refused.
    pub destination: String,
    /// The sink that was called.
    pub sink: SinkName,
    /// Method hint for transmit calls.
    pub method: Option<Method>,
    /// Request data for transmit calls.
    pub payload: Option<serde_json::Value>,
    /// Transmit or include.
    pub kind: OperationKind,
}

impl BlockedCall {
    /// Build the diagnostic for an intent.
    #[must_use]
    pub fn from_intent(intent: &Intent) -> Self {
        Self {
            destination: intent.destination().to_string(),
            sink: intent.sink(),
            method: intent.method(),
            payload: intent.payload().cloned(),
            kind: intent.kind(),
        }
    }

    fn payload_text(&self) -> String {
        match &self.payload {
            None => "null".to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl fmt::Display for BlockedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OperationKind::Include => write!(
                f,
                "Suspicious Activity: {} included, in [ {} ]",
                self.destination, self.sink
            ),
            OperationKind::Transmit => {
                write!(
                    f,
                    "Suspicious Activity: {} requested, using [ {} ] in [ {} ]",
                    self.destination,
                    self.payload_text(),
                    self.sink
                )?;
                if let Some(method) = self.method {
                    write!(f, " via HTTP {method}")?;
                }
                Ok(())
            },
        }
    }
}

/// Failure reported by a host's native sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host rejected the operation.
    #[error("host rejected {sink}: {reason}")]
    Rejected {
        /// Sink that failed.
        sink: SinkName,
        /// Host-supplied reason.
        reason: String,
    },

    /// The sink is not available on this host.
    #[error("{0} is not available on this host")]
    Unavailable(SinkName),
}

/// Errors surfaced to callers of guarded sinks and activation handles.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The call was blocked and the native sink never ran.
    #[error("{0}")]
    Blocked(Box<BlockedCall>),

    /// The handle deliberately does not expose its internal instance.
    #[error("instance of {subsystem} is not accessible")]
    InstanceNotAccessible {
        /// Subsystem whose instance was requested.
        subsystem: &'static str,
    },

    /// The native sink ran and failed.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl GuardError {
    /// Build a blocked error for an intent.
    #[must_use]
    pub fn blocked(intent: &Intent) -> Self {
        Self::Blocked(Box::new(BlockedCall::from_intent(intent)))
    }

    /// Whether this error is a block.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    /// The block diagnostic, if this error is a block.
    #[must_use]
    pub fn blocked_call(&self) -> Option<&BlockedCall> {
        match self {
            Self::Blocked(call) => Some(call),
            _ => None,
        }
    }
}

/// Result type for guarded operations.
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_block_message() {
        let intent = Intent::include(SinkName::SetAttribute, "https://evil.example.com/x.js");
        let err = GuardError::blocked(&intent);
        assert_eq!(
            err.to_string(),
            "Suspicious Activity: https://evil.example.com/x.js included, in [ HTMLElement.setAttribute ]"
        );
    }

    #[test]
    fn test_transmit_block_message_includes_method_and_payload() {
        let intent = Intent::transmit(
            SinkName::SendBeacon,
            "https://evil.example.com/x",
            Method::Post,
            Some(serde_json::Value::String("hello".into())),
        );
        let err = GuardError::blocked(&intent);
        let msg = err.to_string();
        assert!(msg.contains("https://evil.example.com/x"));
        assert!(msg.contains("[ hello ]"));
        assert!(msg.contains("[ Navigator.sendBeacon ]"));
        assert!(msg.ends_with("via HTTP POST"));
    }

    #[test]
    fn test_transmit_without_payload_prints_null() {
        let intent = Intent::transmit(
            SinkName::ImageSrc,
            "https://t.example.com/p.gif",
            Method::Get,
            None,
        );
        assert!(GuardError::blocked(&intent).to_string().contains("[ null ]"));
    }

    #[test]
    fn test_blocked_accessors() {
        let intent = Intent::include(SinkName::SetAttribute, "x");
        let err = GuardError::blocked(&intent);
        assert!(err.is_blocked());
        assert_eq!(err.blocked_call().unwrap().sink, SinkName::SetAttribute);

        let err = GuardError::InstanceNotAccessible {
            subsystem: "interceptor",
        };
        assert!(!err.is_blocked());
        assert!(err.blocked_call().is_none());
    }
}
