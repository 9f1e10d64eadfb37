//! The two fixed internal subscribers: whitelist check, then validator dispatch.

use std::sync::Arc;
use tracing::debug;

use zhorn_core::Intent;
use zhorn_events::{IntentSubscriber, Verdict};
use zhorn_policy::UrlVetter;

use crate::activation::PolicySlot;

/// Reason given when a guarded call happens with no active policy.
pub(crate) const NO_ACTIVE_POLICY: &str = "no active policy";

/// Vetoes every intent whose destination is not whitelisted.
pub(crate) struct WhitelistCheck {
    slot: Arc<PolicySlot>,
}

impl WhitelistCheck {
    pub(crate) fn new(slot: Arc<PolicySlot>) -> Self {
        Self { slot }
    }
}

impl IntentSubscriber for WhitelistCheck {
    fn on_intent(&self, intent: &Intent) -> Verdict {
        let Some(store) = self.slot.current() else {
            return Verdict::veto(NO_ACTIVE_POLICY);
        };
        match store.is_allowed(intent.destination()) {
            Ok(true) => Verdict::Approve,
            Ok(false) => Verdict::veto("destination not whitelisted"),
            Err(e) => Verdict::veto(e.to_string()),
        }
    }

    fn name(&self) -> &'static str {
        "whitelist"
    }
}

/// Runs the custom validator, only for intents the whitelist approved.
pub(crate) struct ValidatorDispatch {
    slot: Arc<PolicySlot>,
    vetter: Arc<dyn UrlVetter>,
}

impl ValidatorDispatch {
    pub(crate) fn new(slot: Arc<PolicySlot>, vetter: Arc<dyn UrlVetter>) -> Self {
        Self { slot, vetter }
    }
}

impl IntentSubscriber for ValidatorDispatch {
    fn on_intent(&self, intent: &Intent) -> Verdict {
        // The whitelist runs first; a vetoed intent never reaches the validator.
        if intent.is_vetoed() {
            return Verdict::Approve;
        }
        let Some(store) = self.slot.current() else {
            return Verdict::veto(NO_ACTIVE_POLICY);
        };
        match store.validate(self.vetter.as_ref(), &intent.snapshot()) {
            Ok(()) => Verdict::Approve,
            Err(e) => {
                debug!(intent_id = %intent.id(), error = %e, "Validator rejected intent");
                Verdict::veto(e.to_string())
            },
        }
    }

    fn name(&self) -> &'static str {
        "validator"
    }
}
