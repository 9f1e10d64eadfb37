//! Mock hosts, recording sinks and spies.
//!
//! Every mock uses `std::sync::Mutex` so tests can drive it without a
//! runtime. Poisoned locks are recovered; a panicking test already failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use zhorn_core::{GuardResult, HostError, IntentSnapshot, SinkName};
use zhorn_events::{Notification, NotificationBus, NotificationReceiver};
use zhorn_interceptor::{
    AttributeChange, BeaconSink, ChangeListener, Document, Element, HostResponse, ImageFactory,
    ImageResource, ListenerId, OutboundRequest, RequestSink,
};
use zhorn_policy::{UrlVetter, ValidationError, Validator};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Elements and documents
// ---------------------------------------------------------------------------

/// In-memory element.
///
/// With `notifies` set, native writes fire change notifications the way a
/// modern host does. Without it, only the shim's synthetic dispatches reach
/// listeners. Every dispatched change is also kept in [`MockElement::changes`].
pub struct MockElement {
    tag: String,
    notifies: bool,
    attributes: Mutex<HashMap<String, String>>,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
    next_listener: AtomicU64,
    changes: Mutex<Vec<AttributeChange>>,
    writes: Mutex<Vec<(String, Option<String>)>>,
    inner_html: Mutex<Option<String>>,
}

impl std::fmt::Debug for MockElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockElement")
            .field("tag", &self.tag)
            .field("notifies", &self.notifies)
            .field("attributes", &*lock(&self.attributes))
            .finish_non_exhaustive()
    }
}

impl MockElement {
    fn build(tag: &str, notifies: bool) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            notifies,
            attributes: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            changes: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            inner_html: Mutex::new(None),
        })
    }

    /// Element whose native writes notify listeners.
    #[must_use]
    pub fn new(tag: &str) -> Arc<Self> {
        Self::build(tag, true)
    }

    /// Element on a host whose native writes are silent.
    #[must_use]
    pub fn silent(tag: &str) -> Arc<Self> {
        Self::build(tag, false)
    }

    /// The element as a trait object.
    #[must_use]
    pub fn as_element(self: &Arc<Self>) -> Arc<dyn Element> {
        Arc::clone(self) as Arc<dyn Element>
    }

    /// Every change dispatched on this element, oldest first.
    #[must_use]
    pub fn changes(&self) -> Vec<AttributeChange> {
        lock(&self.changes).clone()
    }

    /// Every native write, oldest first. `None` values are removals.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, Option<String>)> {
        lock(&self.writes).clone()
    }

    /// Markup last written through the native markup sink.
    #[must_use]
    pub fn inner_html(&self) -> Option<String> {
        lock(&self.inner_html).clone()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

impl Element for MockElement {
    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        lock(&self.attributes).get(name).cloned()
    }

    fn write_attribute(&self, name: &str, value: Option<&str>) -> Result<(), HostError> {
        let previous = {
            let mut attributes = lock(&self.attributes);
            match value {
                Some(v) => attributes.insert(name.to_string(), v.to_string()),
                None => attributes.remove(name),
            }
        };
        lock(&self.writes).push((name.to_string(), value.map(str::to_string)));
        if self.notifies
            && let Some(change) = AttributeChange::between(name, previous.as_deref(), value)
        {
            self.dispatch_attribute_change(&change);
        }
        Ok(())
    }

    fn write_inner_html(&self, html: &str) -> Result<(), HostError> {
        *lock(&self.inner_html) = Some(html.to_string());
        Ok(())
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).push((id, listener));
        id
    }

    fn remove_change_listener(&self, id: ListenerId) {
        lock(&self.listeners).retain(|(existing, _)| *existing != id);
    }

    fn dispatch_attribute_change(&self, change: &AttributeChange) {
        lock(&self.changes).push(change.clone());
        // Listeners may touch the element again; never hold the lock while
        // they run.
        let listeners: Vec<ChangeListener> =
            lock(&self.listeners).iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(change);
        }
    }
}

/// Host document for shim probing.
#[derive(Debug)]
pub struct MockDocument {
    mutation_observer: bool,
    root: Arc<MockElement>,
}

impl MockDocument {
    /// A modern host: has a mutation observer. The guard runs natively.
    #[must_use]
    pub fn modern() -> Arc<Self> {
        Arc::new(Self {
            mutation_observer: true,
            root: MockElement::new("html"),
        })
    }

    /// A legacy host whose attribute writes still notify. Detection passes
    /// and the guard runs natively.
    #[must_use]
    pub fn legacy_notifying() -> Arc<Self> {
        Arc::new(Self {
            mutation_observer: false,
            root: MockElement::new("html"),
        })
    }

    /// A legacy host with broken attribute notifications. The guard runs
    /// shimmed.
    #[must_use]
    pub fn legacy_broken() -> Arc<Self> {
        Arc::new(Self {
            mutation_observer: false,
            root: MockElement::silent("html"),
        })
    }

    /// Root element.
    #[must_use]
    pub fn root(&self) -> &Arc<MockElement> {
        &self.root
    }
}

impl Document for MockDocument {
    fn has_mutation_observer(&self) -> bool {
        self.mutation_observer
    }

    fn document_element(&self) -> Arc<dyn Element> {
        self.root.as_element()
    }
}

// ---------------------------------------------------------------------------
// Recording sinks
// ---------------------------------------------------------------------------

/// A beacon call seen by [`RecordingBeacon`].
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconCall {
    /// Destination.
    pub url: String,
    /// Payload.
    pub data: Option<Value>,
}

/// Beacon sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingBeacon {
    calls: Mutex<Vec<BeaconCall>>,
    failing: AtomicBool,
}

impl RecordingBeacon {
    /// New recorder returning `Ok(true)`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent calls fail with [`HostError::Rejected`].
    pub fn fail_next_calls(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Calls received.
    #[must_use]
    pub fn calls(&self) -> Vec<BeaconCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl BeaconSink for RecordingBeacon {
    fn send_beacon(&self, url: &str, data: Option<&Value>) -> Result<bool, HostError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HostError::Rejected {
                sink: SinkName::SendBeacon,
                reason: "beacon queue full".to_string(),
            });
        }
        lock(&self.calls).push(BeaconCall {
            url: url.to_string(),
            data: data.cloned(),
        });
        Ok(true)
    }
}

/// Request sink that records every dispatch and answers with a fixed status.
#[derive(Debug)]
pub struct RecordingRequester {
    status: u16,
    calls: Mutex<Vec<(SinkName, OutboundRequest)>>,
}

impl RecordingRequester {
    /// Recorder answering `200`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_status(200)
    }

    /// Recorder answering `status`.
    #[must_use]
    pub fn with_status(status: u16) -> Arc<Self> {
        Arc::new(Self {
            status,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Dispatches received, with the sink that made them.
    #[must_use]
    pub fn calls(&self) -> Vec<(SinkName, OutboundRequest)> {
        lock(&self.calls).clone()
    }

    /// Number of dispatches received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl RequestSink for RecordingRequester {
    fn dispatch(&self, sink: SinkName, request: &OutboundRequest) -> Result<HostResponse, HostError> {
        lock(&self.calls).push((sink, request.clone()));
        Ok(HostResponse::status(self.status))
    }
}

/// Image that records every `src` it loads.
#[derive(Debug, Default)]
pub struct MockImage {
    src: Mutex<Option<String>>,
    alt: Mutex<Option<String>>,
    loads: Mutex<Vec<String>>,
}

impl MockImage {
    /// New empty image.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every `src` loaded, oldest first.
    #[must_use]
    pub fn loads(&self) -> Vec<String> {
        lock(&self.loads).clone()
    }
}

impl ImageResource for MockImage {
    fn src(&self) -> Option<String> {
        lock(&self.src).clone()
    }

    fn set_src(&self, src: &str) -> GuardResult<()> {
        *lock(&self.src) = Some(src.to_string());
        lock(&self.loads).push(src.to_string());
        Ok(())
    }

    fn alt(&self) -> Option<String> {
        lock(&self.alt).clone()
    }

    fn set_alt(&self, alt: &str) -> GuardResult<()> {
        *lock(&self.alt) = Some(alt.to_string());
        Ok(())
    }

    fn complete(&self) -> bool {
        lock(&self.src).is_some()
    }
}

/// Image factory keeping every image it creates.
#[derive(Debug, Default)]
pub struct MockImageFactory {
    created: Mutex<Vec<Arc<MockImage>>>,
}

impl MockImageFactory {
    /// New factory.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Images created so far.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<MockImage>> {
        lock(&self.created).clone()
    }

    /// Every `src` loaded across all created images.
    #[must_use]
    pub fn loads(&self) -> Vec<String> {
        lock(&self.created).iter().flat_map(|i| i.loads()).collect()
    }
}

impl ImageFactory for MockImageFactory {
    fn create_image(&self) -> Arc<dyn ImageResource> {
        let image = MockImage::new();
        lock(&self.created).push(Arc::clone(&image));
        image
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// What a [`SpyValidator`] does when called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpyOutcome {
    /// Accept.
    Approve,
    /// Reject with this message.
    Reject(String),
    /// Panic with this message.
    Panic(String),
}

type SpyHook = Box<dyn Fn(&IntentSnapshot) + Send + Sync>;

/// Validator that records every snapshot it sees.
pub struct SpyValidator {
    outcome: SpyOutcome,
    seen: Mutex<Vec<IntentSnapshot>>,
    hook: Option<SpyHook>,
}

impl std::fmt::Debug for SpyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyValidator")
            .field("outcome", &self.outcome)
            .field("calls", &lock(&self.seen).len())
            .finish_non_exhaustive()
    }
}

impl SpyValidator {
    fn build(outcome: SpyOutcome) -> Self {
        Self {
            outcome,
            seen: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    /// Spy that approves.
    #[must_use]
    pub fn approving() -> Arc<Self> {
        Arc::new(Self::build(SpyOutcome::Approve))
    }

    /// Spy that rejects with `message`.
    #[must_use]
    pub fn rejecting(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(SpyOutcome::Reject(message.into())))
    }

    /// Spy that panics with `message`.
    #[must_use]
    pub fn panicking(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(SpyOutcome::Panic(message.into())))
    }

    /// Spy that approves after running `hook`. Used to make nested guarded
    /// calls from inside validation.
    #[must_use]
    pub fn with_hook(hook: impl Fn(&IntentSnapshot) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            hook: Some(Box::new(hook)),
            ..Self::build(SpyOutcome::Approve)
        })
    }

    /// Snapshots seen, oldest first.
    #[must_use]
    pub fn seen(&self) -> Vec<IntentSnapshot> {
        lock(&self.seen).clone()
    }

    /// Number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.seen).len()
    }
}

impl Validator for SpyValidator {
    fn validate(
        &self,
        _vetter: &dyn UrlVetter,
        intent: &IntentSnapshot,
    ) -> Result<(), ValidationError> {
        lock(&self.seen).push(intent.clone());
        if let Some(hook) = &self.hook {
            hook(intent);
        }
        match &self.outcome {
            SpyOutcome::Approve => Ok(()),
            SpyOutcome::Reject(message) => Err(ValidationError::new(message.clone())),
            SpyOutcome::Panic(message) => panic!("{message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Collects notifications published on a bus.
pub struct EventLog {
    receiver: Mutex<NotificationReceiver>,
    collected: Mutex<Vec<Arc<Notification>>>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}

impl EventLog {
    /// Subscribe to `bus`. Only notifications published afterwards are seen.
    #[must_use]
    pub fn attach(bus: &NotificationBus) -> Self {
        Self {
            receiver: Mutex::new(bus.subscribe()),
            collected: Mutex::new(Vec::new()),
        }
    }

    fn pump(&self) {
        let fresh = lock(&self.receiver).drain();
        lock(&self.collected).extend(fresh);
    }

    /// Every notification received so far.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Notification>> {
        self.pump();
        lock(&self.collected).clone()
    }

    /// Event types received so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.all().iter().map(|n| n.event_type()).collect()
    }

    /// Number of notifications of `event_type`.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.all()
            .iter()
            .filter(|n| n.event_type() == event_type)
            .count()
    }

    /// Forget everything received so far.
    pub fn clear(&self) {
        self.pump();
        lock(&self.collected).clear();
    }
}
