//! The guard: context object owning the wrapper registry, the policy slot,
//! the intent bus and the adapters, and running every guarded call through
//! the enforcement pipeline.
//!
//! # Pipeline
//!
//! `IntentBuilt -> Vetted -> PolicyChecked -> Sanitized -> Forwarded`
//!
//! 1. **Vetting**: the destination is classified structurally. A neutralized
//!    destination blocks immediately; the intent is never published.
//! 2. **Policy**: the intent is published. The whitelist subscriber runs
//!    first and the validator only sees whitelisted intents. Any veto blocks.
//! 3. **Sanitization** (include path only): the `(tag, attribute, value)`
//!    triple is certified. A rejection blocks.
//! 4. **Forwarding**: the captured native sink runs with the certified value.
//!
//! All three block causes surface as the same [`GuardError::Blocked`]. An
//! adapter that panics blocks with the cause of the stage it failed in.
//!
//! Markup assignment sanitizes first and then runs every resource left in
//! the certified markup through stages 1 and 2. Script URLs are vetted with
//! [`VetOptions::script_url`] and skip sanitization.

use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use zhorn_core::{
    BlockCause, BlockedCall, GuardError, GuardResult, HostError, Intent, Method, SinkCategory,
    SinkName,
};
use zhorn_events::{
    Decision, IntentBus, Notification, NotificationBus, NotificationMetadata, panic_message,
};
use zhorn_policy::{
    ContentSanitizer, ProfileSanitizer, SchemeVetter, UrlVetter, VetOptions, markup_resources,
};

use crate::activation::{GuardHandle, PolicyConfig, PolicySlot};
use crate::deferred::DeferredQueue;
use crate::host::{Element, HostResponse, HostSinks, ImageResource, OutboundRequest};
use crate::image::GuardedImage;
use crate::registry::SinkRegistry;
use crate::shim::{AttributeChange, ShimMode};
use crate::subscribers::{ValidatorDispatch, WhitelistCheck};

/// Attributes that enter the pipeline on `setAttribute` by default.
pub const DEFAULT_GUARDED_ATTRIBUTES: [&str; 2] = ["href", "src"];

const SOURCE: &str = "zhorn-interceptor";

const ADAPTER_FAILED: &str = "adapter failed";

/// Run an adapter call, turning a panic into `None`.
fn contain<T>(adapter: &'static str, call: impl FnOnce() -> T) -> Option<T> {
    catch_unwind(AssertUnwindSafe(call))
        .map_err(|payload| {
            warn!(
                adapter,
                error = %panic_message(payload.as_ref()),
                "Adapter panicked, failing closed"
            );
        })
        .ok()
}

struct GuardInner {
    registry: SinkRegistry,
    host: HostSinks,
    policy: Arc<PolicySlot>,
    bus: IntentBus,
    vetter: Arc<dyn UrlVetter>,
    sanitizer: Arc<dyn ContentSanitizer>,
    vet_options: VetOptions,
    guarded_attributes: HashSet<String>,
    deferred: DeferredQueue,
    notifications: NotificationBus,
}

/// Sink interception and policy enforcement engine.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Guard {
    inner: Arc<GuardInner>,
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("active", &self.is_active())
            .field("registry", &self.inner.registry)
            .field("bus", &self.inner.bus)
            .field("deferred", &self.inner.deferred)
            .finish_non_exhaustive()
    }
}

/// Non-owning reference to a [`Guard`], for validators that make guarded
/// calls themselves.
#[derive(Clone)]
pub struct WeakGuard {
    inner: Weak<GuardInner>,
}

impl WeakGuard {
    /// Upgrade to a guard if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Guard> {
        self.inner.upgrade().map(|inner| Guard { inner })
    }
}

impl fmt::Debug for WeakGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakGuard")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Builder for [`Guard`].
pub struct GuardBuilder {
    host: HostSinks,
    vetter: Arc<dyn UrlVetter>,
    sanitizer: Arc<dyn ContentSanitizer>,
    vet_options: VetOptions,
    guarded_attributes: HashSet<String>,
    notifications: Option<NotificationBus>,
}

impl Default for GuardBuilder {
    fn default() -> Self {
        Self {
            host: HostSinks::default(),
            vetter: Arc::new(SchemeVetter::new()),
            sanitizer: Arc::new(ProfileSanitizer::new()),
            vet_options: VetOptions::guarded(),
            guarded_attributes: DEFAULT_GUARDED_ATTRIBUTES
                .iter()
                .map(|a| (*a).to_string())
                .collect(),
            notifications: None,
        }
    }
}

impl GuardBuilder {
    /// Native sinks of the host.
    #[must_use]
    pub fn host(mut self, host: HostSinks) -> Self {
        self.host = host;
        self
    }

    /// Replace the URL vetting adapter.
    #[must_use]
    pub fn vetter(mut self, vetter: Arc<dyn UrlVetter>) -> Self {
        self.vetter = vetter;
        self
    }

    /// Replace the content sanitizer adapter.
    #[must_use]
    pub fn sanitizer(mut self, sanitizer: Arc<dyn ContentSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Options passed to the vetter on every call.
    #[must_use]
    pub fn vet_options(mut self, options: VetOptions) -> Self {
        self.vet_options = options;
        self
    }

    /// Attributes that enter the pipeline on `set_attribute`.
    #[must_use]
    pub fn guarded_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.guarded_attributes = attributes
            .into_iter()
            .map(|a| a.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Share an existing notification bus (e.g. with observers).
    #[must_use]
    pub fn notifications(mut self, bus: NotificationBus) -> Self {
        self.notifications = Some(bus);
        self
    }

    /// Build the guard and wrap every host sink.
    #[must_use]
    pub fn build(self) -> Guard {
        let policy = Arc::new(PolicySlot::default());
        let bus = IntentBus::new();
        bus.register(Arc::new(WhitelistCheck::new(Arc::clone(&policy))));
        bus.register(Arc::new(ValidatorDispatch::new(
            Arc::clone(&policy),
            Arc::clone(&self.vetter),
        )));

        let registry = SinkRegistry::new();
        registry.install(&self.host);

        Guard {
            inner: Arc::new(GuardInner {
                registry,
                host: self.host,
                policy,
                bus,
                vetter: self.vetter,
                sanitizer: self.sanitizer,
                vet_options: self.vet_options,
                guarded_attributes: self.guarded_attributes,
                deferred: DeferredQueue::new(),
                notifications: self.notifications.unwrap_or_default(),
            }),
        }
    }
}

/// Attribute context for sanitization on the include path.
struct Inclusion<'a> {
    tag: &'a str,
    attribute: &'a str,
}

impl Guard {
    /// Start building a guard.
    #[must_use]
    pub fn builder() -> GuardBuilder {
        GuardBuilder::default()
    }

    /// A guard over the given host with default adapters.
    #[must_use]
    pub fn new(host: HostSinks) -> Self {
        Self::builder().host(host).build()
    }

    /// Non-owning reference to this guard.
    #[must_use]
    pub fn downgrade(&self) -> WeakGuard {
        WeakGuard {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Activate interception with a policy.
    ///
    /// While a policy is active this returns the existing handle and ignores
    /// `config`. Wrappers removed by [`SinkRegistry::restore`] are reinstalled.
    pub fn activate(&self, config: PolicyConfig) -> GuardHandle {
        let reinstalled = self.inner.registry.install(&self.inner.host);
        let (store, fresh) = self.inner.policy.get_or_install(|| config.into_store());
        if fresh {
            info!(
                entries = store.whitelist().len(),
                match_mode = %store.match_mode(),
                reinstalled,
                "Interception activated"
            );
        } else {
            debug!("Interception already active, returning existing handle");
        }
        GuardHandle::new(Arc::clone(&self.inner.policy), store)
    }

    /// Whether a policy is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.policy.current().is_some()
    }

    /// The wrapper registry.
    #[must_use]
    pub fn registry(&self) -> &SinkRegistry {
        &self.inner.registry
    }

    /// Bus on which outbound-intent and blocked-call notifications are published.
    #[must_use]
    pub fn notifications(&self) -> &NotificationBus {
        &self.inner.notifications
    }

    /// Run every deferred attribute mutation queued so far.
    pub fn run_deferred(&self) -> usize {
        self.inner.deferred.run_pending()
    }

    /// Number of deferred mutations waiting for [`Guard::run_deferred`].
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.inner.deferred.len()
    }

    // ------------------------------------------------------------------
    // Guarded sinks
    // ------------------------------------------------------------------

    /// Guarded `setAttribute`.
    ///
    /// Only guarded attributes (default `href`, `src`) enter the pipeline.
    ///
    /// # Errors
    ///
    /// [`GuardError::Blocked`] when the value is refused, [`GuardError::Host`]
    /// when the native sink fails or is not installed.
    pub fn set_attribute(
        &self,
        element: &Arc<dyn Element>,
        name: &str,
        value: &str,
    ) -> GuardResult<()> {
        let guarded = self.inner.guarded_attributes.contains(&name.to_ascii_lowercase());
        self.mutate_attribute(element, SinkName::SetAttribute, name, value, |value| {
            if guarded {
                self.check_inclusion(element.as_ref(), name, value)
            } else {
                Ok(value.to_string())
            }
        })
    }

    /// Guarded `src` assignment on a script element.
    ///
    /// The URL is vetted with [`VetOptions::script_url`] and then goes
    /// through policy, so script, data and blob URLs are refused only when
    /// the whitelist or validator refuses them. Writes go through the
    /// attribute natives and follow their shim mode.
    ///
    /// # Errors
    ///
    /// See [`Guard::set_attribute`].
    pub fn set_script_src(&self, element: &Arc<dyn Element>, url: &str) -> GuardResult<()> {
        self.mutate_attribute(element, SinkName::ScriptSrc, "src", url, |url| {
            let intent = Intent::include(SinkName::ScriptSrc, url.trim());
            self.run_pipeline_with(&intent, None, &VetOptions::script_url())?;
            Ok(url.trim().to_string())
        })
    }

    /// Guarded `innerHTML` assignment.
    ///
    /// The markup is cleaned by the sanitizer. Every resource left in the
    /// cleaned markup then goes through vetting and policy on its own, and
    /// one refusal blocks the whole write. The host receives the cleaned
    /// markup.
    ///
    /// # Errors
    ///
    /// [`GuardError::Blocked`] when the markup or one of its resources is
    /// refused, [`GuardError::Host`] when the native sink fails or is not
    /// installed.
    pub fn set_inner_html(&self, element: &Arc<dyn Element>, markup: &str) -> GuardResult<()> {
        let native = self
            .inner
            .registry
            .markup()
            .ok_or(HostError::Unavailable(SinkName::InnerHtml))?;
        let intent = Intent::include(SinkName::InnerHtml, markup);
        debug!(
            intent_id = %intent.id(),
            sink = %intent.sink(),
            state = "intent_built",
            "Guarded markup"
        );

        let sanitized = contain("sanitizer", || self.inner.sanitizer.sanitize_markup(markup));
        let certified = match sanitized {
            Some(Ok(certified)) => certified,
            Some(Err(e)) => {
                return Err(self.block(&intent, BlockCause::SanitizationRejected, &e.to_string()));
            },
            None => {
                return Err(self.block(&intent, BlockCause::SanitizationRejected, ADAPTER_FAILED));
            },
        };

        for resource in markup_resources(&certified) {
            let include = Intent::include(SinkName::InnerHtml, resource.url);
            self.run_pipeline(&include, None)?;
        }

        debug!(intent_id = %intent.id(), state = "forwarded", "Guarded markup");
        native.set_inner_html(element.as_ref(), &certified)?;
        Ok(())
    }

    /// Write an attribute through the captured natives once `certify` has
    /// approved the value.
    ///
    /// Shimmed hosts get the change notification now and the write on the
    /// next deferred drain. The write's queue slot is reserved before
    /// `certify` runs, so guarded calls nested inside it queue behind it and
    /// a drain during it leaves the slot in place.
    fn mutate_attribute<F>(
        &self,
        element: &Arc<dyn Element>,
        sink: SinkName,
        name: &str,
        value: &str,
        certify: F,
    ) -> GuardResult<()>
    where
        F: FnOnce(&str) -> GuardResult<String>,
    {
        let (natives, shim) = self
            .inner
            .registry
            .attributes()
            .ok_or(HostError::Unavailable(sink))?;

        match shim {
            ShimMode::Native => {
                let value = certify(value)?;
                natives.set_attribute(element.as_ref(), name, &value)?;
                Ok(())
            },
            ShimMode::Shimmed => {
                let previous = element.get_attribute(name);
                let slot = self.inner.deferred.reserve();

                let value = match certify(value) {
                    Ok(value) => value,
                    Err(e) => {
                        self.inner.deferred.cancel(slot);
                        return Err(e);
                    },
                };

                if let Some(change) =
                    AttributeChange::between(name, previous.as_deref(), Some(value.as_str()))
                {
                    element.dispatch_attribute_change(&change);
                }
                let element = Arc::clone(element);
                let name = name.to_string();
                self.inner.deferred.fill(slot, move || {
                    natives.set_attribute(element.as_ref(), &name, &value)
                });
                Ok(())
            },
        }
    }

    /// Guarded `removeAttribute`. Never vetted; shimmed hosts get a removal
    /// notification and a deferred removal.
    ///
    /// # Errors
    ///
    /// [`GuardError::Host`] when the native sink fails or is not installed.
    pub fn remove_attribute(&self, element: &Arc<dyn Element>, name: &str) -> GuardResult<()> {
        let (natives, shim) = self
            .inner
            .registry
            .attributes()
            .ok_or(HostError::Unavailable(SinkName::SetAttribute))?;

        match shim {
            ShimMode::Native => Ok(natives.remove_attribute(element.as_ref(), name)?),
            ShimMode::Shimmed => {
                let previous = element.get_attribute(name);
                if let Some(change) = AttributeChange::between(name, previous.as_deref(), None) {
                    element.dispatch_attribute_change(&change);
                }
                let element = Arc::clone(element);
                let name = name.to_string();
                self.inner
                    .deferred
                    .schedule(move || natives.remove_attribute(element.as_ref(), &name));
                Ok(())
            },
        }
    }

    /// Guarded `sendBeacon`.
    ///
    /// # Errors
    ///
    /// [`GuardError::Blocked`] when the destination is refused,
    /// [`GuardError::Host`] when the native sink fails or is not installed.
    pub fn send_beacon(&self, url: &str, data: Option<serde_json::Value>) -> GuardResult<bool> {
        let native = self
            .inner
            .registry
            .beacon()
            .ok_or(HostError::Unavailable(SinkName::SendBeacon))?;
        let intent = Intent::transmit(SinkName::SendBeacon, url, Method::Post, data);
        self.run_pipeline(&intent, None)?;
        Ok(native.send_beacon(url, intent.payload())?)
    }

    /// Guarded `XMLHttpRequest.send`.
    ///
    /// # Errors
    ///
    /// See [`Guard::send_beacon`].
    pub fn xhr_send(&self, request: &OutboundRequest) -> GuardResult<HostResponse> {
        self.send_request(SinkName::XhrSend, request)
    }

    /// Guarded `fetch`.
    ///
    /// # Errors
    ///
    /// See [`Guard::send_beacon`].
    pub fn fetch(&self, request: &OutboundRequest) -> GuardResult<HostResponse> {
        self.send_request(SinkName::Fetch, request)
    }

    fn send_request(&self, sink: SinkName, request: &OutboundRequest) -> GuardResult<HostResponse> {
        let native = self
            .inner
            .registry
            .requests()
            .ok_or(HostError::Unavailable(sink))?;
        let intent = Intent::transmit(
            sink,
            request.url.as_str(),
            request.method,
            request.body.clone(),
        );
        self.run_pipeline(&intent, None)?;
        Ok(native.dispatch(sink, request)?)
    }

    /// Construct an image through the host and wrap it.
    ///
    /// # Errors
    ///
    /// [`GuardError::Host`] when the image sink is not installed.
    pub fn create_image(&self) -> GuardResult<GuardedImage> {
        let factory = self
            .inner
            .registry
            .images()
            .ok_or(HostError::Unavailable(SinkName::ImageSrc))?;
        Ok(GuardedImage::new(self.clone(), factory.create_image()))
    }

    /// Wrap an existing image so its `src` goes through the pipeline.
    #[must_use]
    pub fn guard_image(&self, image: Arc<dyn ImageResource>) -> GuardedImage {
        GuardedImage::new(self.clone(), image)
    }

    /// Check an image load. Called by [`GuardedImage::set_src`].
    pub(crate) fn check_image_load(&self, src: &str) -> GuardResult<()> {
        if !self.inner.registry.is_installed(SinkCategory::ImageLoad) {
            return Err(HostError::Unavailable(SinkName::ImageSrc).into());
        }
        let intent = Intent::transmit(SinkName::ImageSrc, src, Method::Get, None);
        self.run_pipeline(&intent, None).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    fn check_inclusion(&self, element: &dyn Element, name: &str, value: &str) -> GuardResult<String> {
        let tag = element.tag_name();
        let intent = Intent::include(SinkName::SetAttribute, value);
        let certified = self.run_pipeline(
            &intent,
            Some(Inclusion {
                tag: &tag,
                attribute: name,
            }),
        )?;
        Ok(certified.unwrap_or_else(|| value.to_string()))
    }

    /// Run an intent through vetting, policy and (for inclusions)
    /// sanitization. Returns the certified value on the include path.
    fn run_pipeline(
        &self,
        intent: &Intent,
        inclusion: Option<Inclusion<'_>>,
    ) -> GuardResult<Option<String>> {
        self.run_pipeline_with(intent, inclusion, &self.inner.vet_options)
    }

    fn run_pipeline_with(
        &self,
        intent: &Intent,
        inclusion: Option<Inclusion<'_>>,
        vet_options: &VetOptions,
    ) -> GuardResult<Option<String>> {
        let inner = &self.inner;
        debug!(
            intent_id = %intent.id(),
            sink = %intent.sink(),
            destination = %intent.destination(),
            state = "intent_built",
            "Guarded call"
        );

        let neutralized = contain("vetter", || {
            inner.vetter.is_neutralized(intent.destination(), vet_options)
        });
        match neutralized {
            Some(false) => {},
            Some(true) => {
                intent.cancel();
                return Err(self.block(
                    intent,
                    BlockCause::VettingRejected,
                    "destination neutralized",
                ));
            },
            None => {
                intent.cancel();
                return Err(self.block(intent, BlockCause::VettingRejected, ADAPTER_FAILED));
            },
        }
        debug!(intent_id = %intent.id(), state = "vetted", "Guarded call");

        let decision = inner.bus.publish(intent);
        inner.notifications.publish(Notification::OutboundIntent {
            metadata: NotificationMetadata::new(SOURCE),
            kind: intent.kind(),
            intent: intent.snapshot(),
            vetoed: decision.is_vetoed(),
        });
        if let Decision::Vetoed(reason) = decision {
            return Err(self.block(intent, BlockCause::PolicyVeto, &reason.to_string()));
        }
        debug!(intent_id = %intent.id(), state = "policy_checked", "Guarded call");

        let certified = match inclusion {
            Some(Inclusion { tag, attribute }) => {
                let sanitized = contain("sanitizer", || {
                    inner.sanitizer.sanitize(intent.destination(), tag, attribute)
                });
                match sanitized {
                    Some(Ok(value)) => Some(value),
                    Some(Err(e)) => {
                        return Err(self.block(
                            intent,
                            BlockCause::SanitizationRejected,
                            &e.to_string(),
                        ));
                    },
                    None => {
                        return Err(self.block(
                            intent,
                            BlockCause::SanitizationRejected,
                            ADAPTER_FAILED,
                        ));
                    },
                }
            },
            None => None,
        };
        debug!(intent_id = %intent.id(), state = "forwarded", "Guarded call");
        Ok(certified)
    }

    fn block(&self, intent: &Intent, cause: BlockCause, reason: &str) -> GuardError {
        warn!(
            intent_id = %intent.id(),
            sink = %intent.sink(),
            destination = %intent.destination(),
            cause = %cause,
            reason,
            "Guarded call blocked"
        );
        self.inner.notifications.publish(Notification::CallBlocked {
            metadata: NotificationMetadata::new(SOURCE),
            blocked: BlockedCall::from_intent(intent),
            cause,
        });
        GuardError::blocked(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BeaconSink, ChangeListener, Document, ListenerId};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zhorn_core::IntentSnapshot;
    use zhorn_policy::{SanitizeError, ValidationError, Validator};

    #[derive(Default)]
    struct Beacon {
        sent: Mutex<Vec<String>>,
    }

    impl BeaconSink for Beacon {
        fn send_beacon(&self, url: &str, _: Option<&serde_json::Value>) -> Result<bool, HostError> {
            self.sent.lock().unwrap().push(url.to_string());
            Ok(true)
        }
    }

    #[derive(Default)]
    struct Node {
        tag: String,
        attrs: Mutex<HashMap<String, String>>,
        changes: Mutex<Vec<AttributeChange>>,
        html: Mutex<Option<String>>,
    }

    impl Node {
        fn new(tag: &str) -> Arc<Self> {
            Arc::new(Self {
                tag: tag.to_string(),
                ..Self::default()
            })
        }
    }

    impl Element for Node {
        fn tag_name(&self) -> String {
            self.tag.clone()
        }
        fn get_attribute(&self, name: &str) -> Option<String> {
            self.attrs.lock().unwrap().get(name).cloned()
        }
        fn write_attribute(&self, name: &str, value: Option<&str>) -> Result<(), HostError> {
            let mut attrs = self.attrs.lock().unwrap();
            match value {
                Some(v) => attrs.insert(name.to_string(), v.to_string()),
                None => attrs.remove(name),
            };
            Ok(())
        }
        fn write_inner_html(&self, html: &str) -> Result<(), HostError> {
            *self.html.lock().unwrap() = Some(html.to_string());
            Ok(())
        }
        fn add_change_listener(&self, _: ChangeListener) -> ListenerId {
            0
        }
        fn remove_change_listener(&self, _: ListenerId) {}
        fn dispatch_attribute_change(&self, change: &AttributeChange) {
            self.changes.lock().unwrap().push(change.clone());
        }
    }

    /// Legacy host: no observer and no native notifications.
    struct LegacyDocument {
        root: Arc<Node>,
    }

    impl Document for LegacyDocument {
        fn has_mutation_observer(&self) -> bool {
            false
        }
        fn document_element(&self) -> Arc<dyn Element> {
            self.root.clone()
        }
    }

    const ALLOWED: &str = "https://a.example.com/collect";

    fn guard_with_beacon() -> (Guard, Arc<Beacon>) {
        let beacon = Arc::new(Beacon::default());
        let guard = Guard::new(HostSinks::new().with_beacon(beacon.clone()));
        (guard, beacon)
    }

    fn shimmed_guard() -> Guard {
        let doc = Arc::new(LegacyDocument {
            root: Node::new("html"),
        });
        Guard::new(HostSinks::new().with_document(doc))
    }

    fn blocked_causes(rx: &mut zhorn_events::NotificationReceiver) -> Vec<BlockCause> {
        rx.drain()
            .iter()
            .filter_map(|n| match n.as_ref() {
                Notification::CallBlocked { cause, .. } => Some(*cause),
                _ => None,
            })
            .collect()
    }

    struct Boom;

    impl ContentSanitizer for Boom {
        fn sanitize(&self, _: &str, _: &str, _: &str) -> Result<String, SanitizeError> {
            panic!("sanitizer exploded")
        }
        fn sanitize_markup(&self, _: &str) -> Result<String, SanitizeError> {
            panic!("sanitizer exploded")
        }
    }

    struct ExplodingVetter;

    impl UrlVetter for ExplodingVetter {
        fn vet(&self, _: &str, _: &VetOptions) -> String {
            panic!("vetter exploded")
        }
    }

    #[test]
    fn test_calls_before_activation_are_blocked() {
        let (guard, beacon) = guard_with_beacon();
        let err = guard.send_beacon(ALLOWED, None).unwrap_err();
        assert!(err.is_blocked());
        assert!(beacon.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_whitelisted_beacon_is_forwarded() {
        let (guard, beacon) = guard_with_beacon();
        guard.activate(PolicyConfig::new([ALLOWED]));

        assert!(guard.send_beacon(ALLOWED, None).unwrap());
        assert_eq!(*beacon.sent.lock().unwrap(), vec![ALLOWED.to_string()]);
    }

    #[test]
    fn test_block_publishes_notification() {
        let (guard, _) = guard_with_beacon();
        guard.activate(PolicyConfig::new([ALLOWED]));
        let mut rx = guard.notifications().subscribe_type("callblocked");

        let err = guard.send_beacon("https://evil.example.com/x", None).unwrap_err();
        assert!(err.to_string().contains("Navigator.sendBeacon"));

        let received = rx.drain();
        assert_eq!(received.len(), 1);
        match received[0].as_ref() {
            Notification::CallBlocked { cause, blocked, .. } => {
                assert_eq!(*cause, BlockCause::PolicyVeto);
                assert_eq!(blocked.destination, "https://evil.example.com/x");
            },
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn test_vetting_block_skips_validator() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let validator = move |_: &dyn UrlVetter, _: &zhorn_core::IntentSnapshot| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ValidationError>(())
        };
        let (guard, _) = guard_with_beacon();
        guard.activate(
            PolicyConfig::new(["javascript:alert(1)"]).with_validator(Arc::new(validator)),
        );
        let mut rx = guard.notifications().subscribe();

        assert!(guard.send_beacon("javascript:alert(1)", None).unwrap_err().is_blocked());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Only the block notification; the intent was never published.
        let received = rx.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event_type(), "callblocked");
    }

    #[test]
    fn test_unguarded_attribute_bypasses_pipeline() {
        let guard = Guard::new(HostSinks::new());
        let node = Node::new("img");
        let element: Arc<dyn Element> = node.clone();

        guard.set_attribute(&element, "alt", "logo").unwrap();
        assert_eq!(node.get_attribute("alt").as_deref(), Some("logo"));
    }

    #[test]
    fn test_guarded_attribute_is_sanitized_before_forwarding() {
        let guard = Guard::new(HostSinks::new());
        guard.activate(PolicyConfig::new(["https://cdn.example.com/logo.png"]));
        let node = Node::new("img");
        let element: Arc<dyn Element> = node.clone();

        guard
            .set_attribute(&element, "src", "https://cdn.example.com/logo.png")
            .unwrap();
        assert_eq!(
            node.get_attribute("src").as_deref(),
            Some("https://cdn.example.com/logo.png")
        );

        // Whitelisted, but anchors are refused by the sanitizer.
        let anchor_node = Node::new("a");
        let anchor: Arc<dyn Element> = anchor_node.clone();
        let err = guard
            .set_attribute(&anchor, "href", "https://cdn.example.com/logo.png")
            .unwrap_err();
        assert!(err.is_blocked());
        assert!(anchor_node.get_attribute("href").is_none());
    }

    #[test]
    fn test_shimmed_mutation_is_deferred_and_notified_first() {
        let doc = Arc::new(LegacyDocument {
            root: Node::new("html"),
        });
        let guard = Guard::new(HostSinks::new().with_document(doc));
        assert_eq!(
            guard
                .registry()
                .record(SinkCategory::AttributeInclusion)
                .unwrap()
                .shim(),
            ShimMode::Shimmed
        );
        guard.activate(PolicyConfig::new(["https://cdn.example.com/a.png"]));

        let node = Node::new("img");
        let element: Arc<dyn Element> = node.clone();
        guard
            .set_attribute(&element, "src", "https://cdn.example.com/a.png")
            .unwrap();

        assert_eq!(node.changes.lock().unwrap().len(), 1);
        assert!(node.get_attribute("src").is_none());
        assert_eq!(guard.run_deferred(), 1);
        assert_eq!(
            node.get_attribute("src").as_deref(),
            Some("https://cdn.example.com/a.png")
        );
    }

    #[test]
    fn test_shimmed_block_cancels_deferred_mutation() {
        let doc = Arc::new(LegacyDocument {
            root: Node::new("html"),
        });
        let guard = Guard::new(HostSinks::new().with_document(doc));
        guard.activate(PolicyConfig::new(["https://cdn.example.com/a.png"]));

        let node = Node::new("img");
        let element: Arc<dyn Element> = node.clone();
        assert!(
            guard
                .set_attribute(&element, "src", "https://evil.example.com/x.png")
                .is_err()
        );
        assert_eq!(guard.pending_mutations(), 0);
        assert!(node.changes.lock().unwrap().is_empty());
        assert_eq!(guard.run_deferred(), 0);
    }

    #[test]
    fn test_shimmed_removal_notifies_and_defers() {
        let doc = Arc::new(LegacyDocument {
            root: Node::new("html"),
        });
        let guard = Guard::new(HostSinks::new().with_document(doc));
        let node = Node::new("div");
        node.write_attribute("title", Some("x")).unwrap();
        let element: Arc<dyn Element> = node.clone();

        guard.remove_attribute(&element, "title").unwrap();
        assert_eq!(
            node.changes.lock().unwrap()[0].kind,
            crate::shim::ChangeKind::Removal
        );
        assert!(node.get_attribute("title").is_some());
        guard.run_deferred();
        assert!(node.get_attribute("title").is_none());
    }

    #[test]
    fn test_restored_registry_reports_unavailable() {
        let (guard, _) = guard_with_beacon();
        guard.activate(PolicyConfig::new([ALLOWED]));
        guard.registry().restore();

        assert!(matches!(
            guard.send_beacon(ALLOWED, None),
            Err(GuardError::Host(HostError::Unavailable(SinkName::SendBeacon)))
        ));
    }

    #[test]
    fn test_guarded_image_checks_src_only() {
        let guard = Guard::new(HostSinks::new());
        guard.activate(PolicyConfig::new(["https://t.example.com/p.gif"]));
        let image = guard.create_image().unwrap();

        image.set_alt("pixel").unwrap();
        assert_eq!(image.alt().as_deref(), Some("pixel"));

        image.set_src("https://t.example.com/p.gif").unwrap();
        assert_eq!(image.src().as_deref(), Some("https://t.example.com/p.gif"));

        assert!(image.set_src("https://evil.example.com/p.gif").unwrap_err().is_blocked());
        assert_eq!(image.src().as_deref(), Some("https://t.example.com/p.gif"));
    }

    #[test]
    fn test_validator_error_blocks() {
        struct Deny;
        impl Validator for Deny {
            fn validate(
                &self,
                _: &dyn UrlVetter,
                _: &zhorn_core::IntentSnapshot,
            ) -> Result<(), ValidationError> {
                Err(ValidationError::new("nope"))
            }
        }

        let (guard, beacon) = guard_with_beacon();
        guard.activate(PolicyConfig::new([ALLOWED]).with_validator(Arc::new(Deny)));
        assert!(guard.send_beacon(ALLOWED, None).unwrap_err().is_blocked());
        assert!(beacon.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drain_inside_validator_keeps_shimmed_write() {
        const SRC: &str = "https://cdn.example.com/a.png";
        let guard = shimmed_guard();
        let weak = guard.downgrade();
        let drained = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&drained);
        let validator = move |_: &dyn UrlVetter, _: &IntentSnapshot| {
            if let Some(guard) = weak.upgrade() {
                d.fetch_add(guard.run_deferred(), Ordering::SeqCst);
            }
            Ok::<(), ValidationError>(())
        };
        guard.activate(PolicyConfig::new([SRC]).with_validator(Arc::new(validator)));

        let node = Node::new("img");
        let element: Arc<dyn Element> = node.clone();
        guard.set_attribute(&element, "alt", "logo").unwrap();
        guard.set_attribute(&element, "src", SRC).unwrap();

        // The nested drain ran the earlier write and held at the reservation.
        assert_eq!(drained.load(Ordering::SeqCst), 1);
        assert_eq!(node.get_attribute("alt").as_deref(), Some("logo"));
        assert!(node.get_attribute("src").is_none());
        assert_eq!(guard.pending_mutations(), 1);

        assert_eq!(guard.run_deferred(), 1);
        assert_eq!(node.get_attribute("src").as_deref(), Some(SRC));
    }

    #[test]
    fn test_panicking_vetter_fails_closed() {
        let beacon = Arc::new(Beacon::default());
        let guard = Guard::builder()
            .host(HostSinks::new().with_beacon(beacon.clone()))
            .vetter(Arc::new(ExplodingVetter))
            .build();
        guard.activate(PolicyConfig::new([ALLOWED]));
        let mut rx = guard.notifications().subscribe_type("callblocked");

        assert!(guard.send_beacon(ALLOWED, None).unwrap_err().is_blocked());
        assert!(beacon.sent.lock().unwrap().is_empty());
        assert_eq!(blocked_causes(&mut rx), vec![BlockCause::VettingRejected]);
    }

    #[test]
    fn test_panicking_sanitizer_fails_closed() {
        let guard = Guard::builder().sanitizer(Arc::new(Boom)).build();
        guard.activate(PolicyConfig::new(["https://cdn.example.com/logo.png"]));
        let mut rx = guard.notifications().subscribe_type("callblocked");
        let node = Node::new("img");
        let element: Arc<dyn Element> = node.clone();

        let err = guard
            .set_attribute(&element, "src", "https://cdn.example.com/logo.png")
            .unwrap_err();
        assert!(err.is_blocked());
        assert!(node.get_attribute("src").is_none());

        assert!(guard.set_inner_html(&element, "<b>x</b>").unwrap_err().is_blocked());
        assert!(node.html.lock().unwrap().is_none());

        assert_eq!(
            blocked_causes(&mut rx),
            vec![BlockCause::SanitizationRejected; 2]
        );
    }

    #[test]
    fn test_inner_html_is_cleaned_and_resources_checked() {
        let guard = Guard::new(HostSinks::new());
        guard.activate(PolicyConfig::new(["https://cdn.example.com/logo.png"]));
        let node = Node::new("div");
        let element: Arc<dyn Element> = node.clone();

        guard
            .set_inner_html(
                &element,
                r#"<p>hi<script>alert(1)</script></p><img src="https://cdn.example.com/logo.png" onerror="x()">"#,
            )
            .unwrap();
        let written = r#"<p>hi</p><img src="https://cdn.example.com/logo.png">"#;
        assert_eq!(node.html.lock().unwrap().as_deref(), Some(written));

        let err = guard
            .set_inner_html(&element, r#"<p><img src="https://evil.example.com/t.gif"></p>"#)
            .unwrap_err();
        assert!(err.is_blocked());
        assert_eq!(node.html.lock().unwrap().as_deref(), Some(written));
    }

    #[test]
    fn test_inner_html_without_host_support_is_unavailable() {
        struct Bare;
        impl Element for Bare {
            fn tag_name(&self) -> String {
                "div".to_string()
            }
            fn get_attribute(&self, _: &str) -> Option<String> {
                None
            }
            fn write_attribute(&self, _: &str, _: Option<&str>) -> Result<(), HostError> {
                Ok(())
            }
            fn add_change_listener(&self, _: ChangeListener) -> ListenerId {
                0
            }
            fn remove_change_listener(&self, _: ListenerId) {}
            fn dispatch_attribute_change(&self, _: &AttributeChange) {}
        }

        let guard = Guard::new(HostSinks::new());
        guard.activate(PolicyConfig::new([ALLOWED]));
        let element: Arc<dyn Element> = Arc::new(Bare);
        assert!(matches!(
            guard.set_inner_html(&element, "<b>x</b>"),
            Err(GuardError::Host(HostError::Unavailable(SinkName::InnerHtml)))
        ));
    }

    #[test]
    fn test_script_src_vets_with_script_options() {
        let guard = Guard::new(HostSinks::new());
        guard.activate(PolicyConfig::new(["https://cdn.example.com/lib.js"]));
        let mut rx = guard.notifications().subscribe_type("callblocked");
        let node = Node::new("script");
        let element: Arc<dyn Element> = node.clone();

        // No script tag in the sanitizer profile, yet the script URL passes.
        guard
            .set_script_src(&element, " https://cdn.example.com/lib.js")
            .unwrap();
        assert_eq!(
            node.get_attribute("src").as_deref(),
            Some("https://cdn.example.com/lib.js")
        );

        // Data URLs pass vetting here and are refused by policy instead.
        assert!(
            guard
                .set_script_src(&element, "data:text/javascript,alert(1)")
                .unwrap_err()
                .is_blocked()
        );
        assert!(guard.set_script_src(&element, "file:///x.js").is_err());
        let img: Arc<dyn Element> = Node::new("img");
        assert!(
            guard
                .set_attribute(&img, "src", "data:text/javascript,alert(1)")
                .is_err()
        );

        assert_eq!(
            blocked_causes(&mut rx),
            vec![
                BlockCause::PolicyVeto,
                BlockCause::VettingRejected,
                BlockCause::VettingRejected,
            ]
        );
    }

    #[test]
    fn test_script_src_follows_shim_mode() {
        let guard = shimmed_guard();
        guard.activate(PolicyConfig::new(["https://cdn.example.com/lib.js"]));
        let node = Node::new("script");
        let element: Arc<dyn Element> = node.clone();

        guard
            .set_script_src(&element, "https://cdn.example.com/lib.js")
            .unwrap();
        assert_eq!(node.changes.lock().unwrap().len(), 1);
        assert!(node.get_attribute("src").is_none());
        assert_eq!(guard.run_deferred(), 1);
        assert!(node.get_attribute("src").is_some());
    }
}
