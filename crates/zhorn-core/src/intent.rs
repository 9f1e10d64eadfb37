//! Intents: one per guarded-sink invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::sink::SinkName;

/// Unique identifier of an intent, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    /// Create a new random intent ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "intent:{}", self.0)
    }
}

/// What a sink does with its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Outbound request or beacon.
    Transmit,
    /// Content or resource inclusion.
    Include,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transmit => write!(f, "transmit"),
            Self::Include => write!(f, "include"),
        }
    }
}

/// HTTP method hint attached to transmit intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `PATCH`
    Patch,
}

impl Method {
    /// Upper-case verb.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "PATCH" => Ok(Self::Patch),
            other => Err(format!("unsupported method '{other}'")),
        }
    }
}

/// A pending sink invocation, published on the intent bus before the sink runs.
///
/// Every field except the veto flag is fixed at construction. The veto flag
/// is monotonic: it flips from `false` to `true` at most once and is never
/// reset.
#[derive(Debug)]
pub struct Intent {
    id: IntentId,
    destination: String,
    kind: OperationKind,
    method: Option<Method>,
    sink: SinkName,
    payload: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    vetoed: AtomicBool,
}

impl Intent {
    /// Build a transmit intent (outbound request or beacon).
    #[must_use]
    pub fn transmit(
        sink: SinkName,
        destination: impl Into<String>,
        method: Method,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: IntentId::new(),
            destination: destination.into(),
            kind: OperationKind::Transmit,
            method: Some(method),
            sink,
            payload,
            created_at: Utc::now(),
            vetoed: AtomicBool::new(false),
        }
    }

    /// Build an include intent. Include intents never carry a method or payload.
    #[must_use]
    pub fn include(sink: SinkName, destination: impl Into<String>) -> Self {
        Self {
            id: IntentId::new(),
            destination: destination.into(),
            kind: OperationKind::Include,
            method: None,
            sink,
            payload: None,
            created_at: Utc::now(),
            vetoed: AtomicBool::new(false),
        }
    }

    /// Unique ID of this intent.
    #[must_use]
    pub fn id(&self) -> IntentId {
        self.id
    }

    /// Raw target being requested or included.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Transmit or include.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Method hint, present only for transmit intents.
    #[must_use]
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// The sink that produced this intent.
    #[must_use]
    pub fn sink(&self) -> SinkName {
        self.sink
    }

    /// Structured payload, present only for transmit intents.
    #[must_use]
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    /// When the intent was built.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Veto this intent.
    ///
    /// Returns `true` if this call performed the `false -> true` transition,
    /// `false` if the intent had already been vetoed.
    pub fn cancel(&self) -> bool {
        self.vetoed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether any subscriber has vetoed this intent.
    #[must_use]
    pub fn is_vetoed(&self) -> bool {
        self.vetoed.load(Ordering::SeqCst)
    }

    /// Owned copy of the intent data, as handed to custom validators.
    #[must_use]
    pub fn snapshot(&self) -> IntentSnapshot {
        IntentSnapshot {
            destination: self.destination.clone(),
            method: self.method,
            sink: self.sink,
            payload: self.payload.clone(),
        }
    }
}

/// Read-only view of an intent's data.
///
/// This is the shape of the outbound-intent notification detail:
/// `{ destination, method?, sink, payload? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSnapshot {
    /// Raw target.
    pub destination: String,
    /// Method hint for transmit intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    /// Producing sink.
    pub sink: SinkName,
    /// Attached request data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}
