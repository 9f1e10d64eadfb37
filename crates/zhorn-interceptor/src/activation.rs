//! Activation lifecycle: policy configuration, the policy slot, and handles.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::info;
use url::Url;

use zhorn_core::{GuardError, GuardResult};
use zhorn_policy::{MatchMode, PolicyStore, Validator};

/// Configuration passed to [`Guard::activate`](crate::Guard::activate).
#[derive(Clone, Default)]
pub struct PolicyConfig {
    whitelist: Vec<String>,
    match_mode: MatchMode,
    base_url: Option<Url>,
    validator: Option<Arc<dyn Validator>>,
}

impl fmt::Debug for PolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyConfig")
            .field("whitelist", &self.whitelist)
            .field("match_mode", &self.match_mode)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl PolicyConfig {
    /// Config with the given whitelist and the default validator.
    #[must_use]
    pub fn new<I, S>(whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            whitelist: whitelist.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the custom validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the whitelist match mode.
    #[must_use]
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Set the base URL for relative destinations.
    #[must_use]
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// Whitelist entries.
    #[must_use]
    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    pub(crate) fn into_store(self) -> PolicyStore {
        let mut builder = PolicyStore::builder()
            .allow_all(self.whitelist)
            .match_mode(self.match_mode);
        if let Some(base) = self.base_url {
            builder = builder.base_url(base);
        }
        if let Some(validator) = self.validator {
            builder = builder.validator(validator);
        }
        builder.build()
    }
}

/// Holder of the active policy store, shared with the internal subscribers.
#[derive(Debug, Default)]
pub(crate) struct PolicySlot {
    store: RwLock<Option<Arc<PolicyStore>>>,
}

impl PolicySlot {
    fn write(&self) -> RwLockWriteGuard<'_, Option<Arc<PolicyStore>>> {
        match self.store.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The active store. A poisoned slot reads as inactive.
    pub(crate) fn current(&self) -> Option<Arc<PolicyStore>> {
        self.store.read().ok().and_then(|s| s.clone())
    }

    /// Install `build()` unless a store is already active; returns the
    /// active store and whether it was newly installed.
    pub(crate) fn get_or_install(
        &self,
        build: impl FnOnce() -> PolicyStore,
    ) -> (Arc<PolicyStore>, bool) {
        let mut slot = self.write();
        if let Some(existing) = slot.as_ref() {
            return (Arc::clone(existing), false);
        }
        let store = Arc::new(build());
        *slot = Some(Arc::clone(&store));
        (store, true)
    }

    /// Release `store` if it is still the active one.
    pub(crate) fn release(&self, store: &Arc<PolicyStore>) -> bool {
        let mut slot = self.write();
        if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, store)) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

/// Handle returned by [`Guard::activate`](crate::Guard::activate).
///
/// Handles from repeated activations of the same guard compare equal while
/// the first activation is live.
#[derive(Clone)]
pub struct GuardHandle {
    slot: Arc<PolicySlot>,
    store: Arc<PolicyStore>,
}

impl fmt::Debug for GuardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardHandle")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl PartialEq for GuardHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl Eq for GuardHandle {}

impl GuardHandle {
    pub(crate) fn new(slot: Arc<PolicySlot>, store: Arc<PolicyStore>) -> Self {
        Self { slot, store }
    }

    /// Release the policy store.
    ///
    /// Wrappers stay installed; guarded calls made afterwards are blocked
    /// until the guard is activated again. Returns whether this call
    /// released the store (a second `destroy` is a no-op).
    pub fn destroy(&self) -> bool {
        let released = self.slot.release(&self.store);
        if released {
            info!(entries = self.store.whitelist().len(), "Interception policy released");
        }
        released
    }

    /// Whether this handle's policy is still the active one.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot
            .current()
            .is_some_and(|active| Arc::ptr_eq(&active, &self.store))
    }

    /// The interception subsystem does not expose its internals.
    ///
    /// # Errors
    ///
    /// Always returns [`GuardError::InstanceNotAccessible`].
    pub fn instance(&self) -> GuardResult<Arc<PolicyStore>> {
        Err(GuardError::InstanceNotAccessible {
            subsystem: "interceptor",
        })
    }
}
