//! Observer notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use zhorn_core::{BlockCause, BlockedCall, IntentSnapshot, OperationKind};

/// Metadata attached to every notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMetadata {
    /// Unique notification ID.
    pub id: Uuid,
    /// When the notification was produced.
    pub timestamp: DateTime<Utc>,
    /// Component that produced it.
    pub source: String,
}

impl NotificationMetadata {
    /// Create metadata for a given source component.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// Best-effort notifications delivered to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An intent was published on the intent bus.
    OutboundIntent {
        /// Notification metadata.
        metadata: NotificationMetadata,
        /// Transmit or include.
        kind: OperationKind,
        /// Intent data.
        intent: IntentSnapshot,
        /// Whether the intent ended up vetoed.
        vetoed: bool,
    },

    /// A guarded call was blocked.
    CallBlocked {
        /// Notification metadata.
        metadata: NotificationMetadata,
        /// The diagnostic that was raised to the caller.
        blocked: BlockedCall,
        /// Internal cause, for observers only.
        cause: BlockCause,
    },

    /// The behavioral heuristics classified the session.
    BotActivity {
        /// Notification metadata.
        metadata: NotificationMetadata,
        /// Whether every selected bot test matched.
        captured: bool,
        /// Per-test outcome; `true` means human activity was observed.
        cases: BTreeMap<String, bool>,
    },

    /// A performance metric became available.
    MetricAvailable {
        /// Notification metadata.
        metadata: NotificationMetadata,
        /// Metric name.
        metric: String,
        /// Measurement (a number or structured data).
        payload: serde_json::Value,
    },
}

impl Notification {
    /// Wire name of this notification.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OutboundIntent {
                kind: OperationKind::Transmit,
                ..
            } => "beforerequest",
            Self::OutboundIntent {
                kind: OperationKind::Include,
                ..
            } => "beforeinclude",
            Self::CallBlocked { .. } => "callblocked",
            Self::BotActivity { .. } => "agentbotactivity",
            Self::MetricAvailable { .. } => "agentmetricavailable",
        }
    }

    /// Notification metadata.
    #[must_use]
    pub fn metadata(&self) -> &NotificationMetadata {
        match self {
            Self::OutboundIntent { metadata, .. }
            | Self::CallBlocked { metadata, .. }
            | Self::BotActivity { metadata, .. }
            | Self::MetricAvailable { metadata, .. } => metadata,
        }
    }

    /// Whether this notification concerns policy enforcement.
    #[must_use]
    pub fn is_enforcement(&self) -> bool {
        matches!(
            self,
            Self::OutboundIntent { .. } | Self::CallBlocked { .. }
        )
    }
}
