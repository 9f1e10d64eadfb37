//! Synchronous publish/veto bus for intents.

use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use zhorn_core::Intent;

/// A single subscriber's answer for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the intent through (as far as this subscriber is concerned).
    Approve,
    /// Block the intent.
    Veto(String),
}

impl Verdict {
    /// Create a veto verdict.
    #[must_use]
    pub fn veto(reason: impl Into<String>) -> Self {
        Self::Veto(reason.into())
    }
}

/// Who vetoed an intent, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetoReason {
    /// Name of the vetoing subscriber.
    pub subscriber: String,
    /// Subscriber-supplied reason.
    pub reason: String,
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subscriber, self.reason)
    }
}

/// Folded outcome of publishing one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No subscriber vetoed.
    Approved,
    /// At least one subscriber vetoed; holds the first veto.
    Vetoed(VetoReason),
}

impl Decision {
    /// Whether the intent was vetoed.
    #[must_use]
    pub fn is_vetoed(&self) -> bool {
        matches!(self, Self::Vetoed(_))
    }

    /// The first veto, if any.
    #[must_use]
    pub fn veto_reason(&self) -> Option<&VetoReason> {
        match self {
            Self::Approved => None,
            Self::Vetoed(reason) => Some(reason),
        }
    }
}

/// Trait for intent subscribers.
///
/// Subscribers run synchronously on the caller's turn. They may themselves
/// trigger guarded calls; the bus holds no lock while a subscriber runs.
pub trait IntentSubscriber: Send + Sync {
    /// Inspect an intent and return a verdict.
    fn on_intent(&self, intent: &Intent) -> Verdict;

    /// Name used in veto reasons and logs.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Registration handle for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

type Entry = (SubscriberId, Arc<dyn IntentSubscriber>);

/// Synchronous intent bus.
///
/// Delivery order is registration order. There is no unsubscribe: the
/// subscriber list is stable for the lifetime of the bus.
#[derive(Default)]
pub struct IntentBus {
    subscribers: RwLock<Vec<Entry>>,
}

impl fmt::Debug for IntentBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentBus")
            .field("subscriber_count", &self.len())
            .finish()
    }
}

impl IntentBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber at the end of the delivery order.
    pub fn register(&self, subscriber: Arc<dyn IntentSubscriber>) -> SubscriberId {
        let id = SubscriberId::new();
        let name = subscriber.name().to_string();

        let mut subs = match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subs.push((id, subscriber));

        debug!(subscriber_name = %name, position = subs.len(), "Intent subscriber registered");
        id
    }

    /// Publish an intent to every subscriber and fold their verdicts.
    ///
    /// All subscribers run even after a veto. The first veto is recorded on
    /// the intent and returned. A subscriber that panics is treated as a veto;
    /// the panic never propagates to the publisher.
    pub fn publish(&self, intent: &Intent) -> Decision {
        // Snapshot so that subscribers may publish nested intents.
        let subs: Vec<Entry> = match self.subscribers.read() {
            Ok(guard) => guard.clone(),
            Err(_) => {
                warn!(intent_id = %intent.id(), "Intent bus lock poisoned, vetoing");
                intent.cancel();
                return Decision::Vetoed(VetoReason {
                    subscriber: "intent_bus".to_string(),
                    reason: "subscriber registry unavailable".to_string(),
                });
            },
        };

        let mut first_veto: Option<VetoReason> = None;

        for (_, subscriber) in &subs {
            trace!(
                intent_id = %intent.id(),
                subscriber_name = %subscriber.name(),
                sink = %intent.sink(),
                "Delivering intent"
            );

            let verdict = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_intent(intent)
            }))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(
                    intent_id = %intent.id(),
                    subscriber_name = %subscriber.name(),
                    error = %message,
                    "Intent subscriber panicked, treating as veto"
                );
                Verdict::Veto(format!("subscriber failed: {message}"))
            });

            if let Verdict::Veto(reason) = verdict {
                intent.cancel();
                debug!(
                    intent_id = %intent.id(),
                    subscriber_name = %subscriber.name(),
                    reason = %reason,
                    "Intent vetoed"
                );
                if first_veto.is_none() {
                    first_veto = Some(VetoReason {
                        subscriber: subscriber.name().to_string(),
                        reason,
                    });
                }
            }
        }

        match first_veto {
            Some(reason) => Decision::Vetoed(reason),
            // A subscriber may have cancelled the intent directly.
            None if intent.is_vetoed() => Decision::Vetoed(VetoReason {
                subscriber: "unknown".to_string(),
                reason: "intent cancelled".to_string(),
            }),
            None => Decision::Approved,
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or_default()
    }

    /// Whether no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Text of a caught panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A closure-backed subscriber.
pub struct FnSubscriber<F>
where
    F: Fn(&Intent) -> Verdict + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&Intent) -> Verdict + Send + Sync,
{
    /// Create a new closure subscriber.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> IntentSubscriber for FnSubscriber<F>
where
    F: Fn(&Intent) -> Verdict + Send + Sync,
{
    fn on_intent(&self, intent: &Intent) -> Verdict {
        (self.handler)(intent)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
