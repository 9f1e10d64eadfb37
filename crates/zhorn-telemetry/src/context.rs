//! Correlation context for a unit of work (one CLI check, one host session).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Correlation data carried through a unit of work and attached to its span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Id of this unit of work.
    pub request_id: Uuid,
    /// Id shared by related units of work.
    pub correlation_id: Uuid,
    /// Parent unit, for child contexts.
    pub parent_id: Option<Uuid>,
    /// Component that created the context.
    pub source: String,
    /// Operation name.
    pub operation: Option<String>,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Free-form labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl RequestContext {
    /// Fresh context; the correlation id equals the request id.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            request_id: id,
            correlation_id: id,
            parent_id: None,
            source: source.into(),
            operation: None,
            started_at: Utc::now(),
            labels: BTreeMap::new(),
        }
    }

    /// Child context sharing this context's correlation id and labels.
    #[must_use]
    pub fn child(&self, source: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            correlation_id: self.correlation_id,
            parent_id: Some(self.request_id),
            source: source.into(),
            operation: None,
            started_at: Utc::now(),
            labels: self.labels.clone(),
        }
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Milliseconds since creation.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// Span carrying the correlation fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            source = %self.source,
            operation = self.operation.as_deref(),
        )
    }
}
