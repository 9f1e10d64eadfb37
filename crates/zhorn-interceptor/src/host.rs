//! Host capability traits.
//!
//! The engine never touches a host runtime directly. A host describes its
//! elements and its native sinks through these traits and hands the natives
//! over once, in [`HostSinks`], when the guard is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

use zhorn_core::{GuardResult, HostError, Method, SinkName};

use crate::shim::AttributeChange;

/// Callback invoked for attribute change notifications on an element.
pub type ChangeListener = Arc<dyn Fn(&AttributeChange) + Send + Sync>;

/// Token returned when registering a [`ChangeListener`].
pub type ListenerId = u64;

/// A host element that attributes can be set on.
pub trait Element: Send + Sync {
    /// Lower- or mixed-case tag name (`img`, `script`, ...).
    fn tag_name(&self) -> String;

    /// Current attribute value.
    fn get_attribute(&self, name: &str) -> Option<String>;

    /// Unguarded host primitive that writes (`Some`) or removes (`None`) an
    /// attribute. Only native sinks call this.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host refuses the write.
    fn write_attribute(&self, name: &str, value: Option<&str>) -> Result<(), HostError>;

    /// Unguarded host primitive that replaces the element's content with
    /// `html`. Only native sinks call this.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host refuses the write. Hosts that keep
    /// the default have no markup sink.
    fn write_inner_html(&self, _html: &str) -> Result<(), HostError> {
        Err(HostError::Unavailable(SinkName::InnerHtml))
    }

    /// Register a listener for attribute change notifications.
    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId;

    /// Remove a previously registered listener.
    fn remove_change_listener(&self, id: ListenerId);

    /// Deliver a change notification to every registered listener.
    fn dispatch_attribute_change(&self, change: &AttributeChange);
}

/// The host document, consulted once when probing for shim support.
pub trait Document: Send + Sync {
    /// Whether the host has a modern mutation observer.
    fn has_mutation_observer(&self) -> bool;

    /// Root element used for the detection mutation.
    fn document_element(&self) -> Arc<dyn Element>;
}

/// Native attribute mutation sink.
pub trait AttributeSink: Send + Sync {
    /// Set an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host rejects the mutation.
    fn set_attribute(&self, element: &dyn Element, name: &str, value: &str)
    -> Result<(), HostError>;

    /// Remove an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host rejects the mutation.
    fn remove_attribute(&self, element: &dyn Element, name: &str) -> Result<(), HostError>;
}

/// Native markup assignment (`innerHTML`).
pub trait MarkupSink: Send + Sync {
    /// Replace an element's content.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host rejects the markup.
    fn set_inner_html(&self, element: &dyn Element, html: &str) -> Result<(), HostError>;
}

/// Native beacon transmission.
pub trait BeaconSink: Send + Sync {
    /// Queue a beacon. Returns whether the host accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host fails outright.
    fn send_beacon(&self, url: &str, data: Option<&Value>) -> Result<bool, HostError>;
}

/// An asynchronous request about to leave the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Request headers, in insertion order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    /// A `GET` request with no body.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// A request with the given method and no body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: Vec::new(),
        }
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What the host reports back for a dispatched request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
    /// Status code (0 when the host has no response yet).
    pub status: u16,
    /// Response body, if the host produced one synchronously.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl HostResponse {
    /// A response with no body.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Native asynchronous request initiation (`XMLHttpRequest.send`, `fetch`).
pub trait RequestSink: Send + Sync {
    /// Dispatch a request.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host fails to dispatch.
    fn dispatch(&self, sink: SinkName, request: &OutboundRequest) -> Result<HostResponse, HostError>;
}

/// Capability interface of an image resource.
pub trait ImageResource: Send + Sync {
    /// Current source.
    fn src(&self) -> Option<String>;

    /// Set the source, which triggers a load.
    ///
    /// # Errors
    ///
    /// A guarded image returns [`zhorn_core::GuardError::Blocked`]; a host
    /// image returns [`zhorn_core::GuardError::Host`].
    fn set_src(&self, src: &str) -> GuardResult<()>;

    /// Alternative text.
    fn alt(&self) -> Option<String>;

    /// Set the alternative text.
    ///
    /// # Errors
    ///
    /// Returns [`zhorn_core::GuardError::Host`] if the host rejects it.
    fn set_alt(&self, alt: &str) -> GuardResult<()>;

    /// Whether loading finished.
    fn complete(&self) -> bool;
}

/// Native image constructor.
pub trait ImageFactory: Send + Sync {
    /// Create a new, unloaded image.
    fn create_image(&self) -> Arc<dyn ImageResource>;
}

/// Attribute sink that writes straight through [`Element::write_attribute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAttributes;

impl AttributeSink for NativeAttributes {
    fn set_attribute(
        &self,
        element: &dyn Element,
        name: &str,
        value: &str,
    ) -> Result<(), HostError> {
        element.write_attribute(name, Some(value))
    }

    fn remove_attribute(&self, element: &dyn Element, name: &str) -> Result<(), HostError> {
        element.write_attribute(name, None)
    }
}

/// Markup sink that writes straight through [`Element::write_inner_html`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMarkup;

impl MarkupSink for NativeMarkup {
    fn set_inner_html(&self, element: &dyn Element, html: &str) -> Result<(), HostError> {
        element.write_inner_html(html)
    }
}

/// Stand-in for sinks the host does not have.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl BeaconSink for NoopSink {
    fn send_beacon(&self, _: &str, _: Option<&Value>) -> Result<bool, HostError> {
        Ok(false)
    }
}

impl RequestSink for NoopSink {
    fn dispatch(&self, _: SinkName, _: &OutboundRequest) -> Result<HostResponse, HostError> {
        Ok(HostResponse::status(0))
    }
}

impl ImageFactory for NoopSink {
    fn create_image(&self) -> Arc<dyn ImageResource> {
        Arc::new(DetachedImage::default())
    }
}

/// Image that records its properties but never loads anything.
#[derive(Debug, Default)]
pub struct DetachedImage {
    src: Mutex<Option<String>>,
    alt: Mutex<Option<String>>,
}

impl ImageResource for DetachedImage {
    fn src(&self) -> Option<String> {
        self.src.lock().ok().and_then(|s| s.clone())
    }

    fn set_src(&self, src: &str) -> GuardResult<()> {
        if let Ok(mut slot) = self.src.lock() {
            *slot = Some(src.to_string());
        }
        Ok(())
    }

    fn alt(&self) -> Option<String> {
        self.alt.lock().ok().and_then(|s| s.clone())
    }

    fn set_alt(&self, alt: &str) -> GuardResult<()> {
        if let Ok(mut slot) = self.alt.lock() {
            *slot = Some(alt.to_string());
        }
        Ok(())
    }

    fn complete(&self) -> bool {
        false
    }
}

/// The native sinks a host makes available.
///
/// Missing sinks are replaced by [`NoopSink`] at install time. Attribute
/// mutation defaults to [`NativeAttributes`] and markup to [`NativeMarkup`].
#[derive(Clone, Default)]
pub struct HostSinks {
    pub(crate) attributes: Option<Arc<dyn AttributeSink>>,
    pub(crate) markup: Option<Arc<dyn MarkupSink>>,
    pub(crate) beacon: Option<Arc<dyn BeaconSink>>,
    pub(crate) requests: Option<Arc<dyn RequestSink>>,
    pub(crate) images: Option<Arc<dyn ImageFactory>>,
    pub(crate) document: Option<Arc<dyn Document>>,
}

impl fmt::Debug for HostSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSinks")
            .field("attributes", &self.attributes.is_some())
            .field("markup", &self.markup.is_some())
            .field("beacon", &self.beacon.is_some())
            .field("requests", &self.requests.is_some())
            .field("images", &self.images.is_some())
            .field("document", &self.document.is_some())
            .finish()
    }
}

impl HostSinks {
    /// No host sinks at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Native attribute mutation.
    #[must_use]
    pub fn with_attributes(mut self, sink: Arc<dyn AttributeSink>) -> Self {
        self.attributes = Some(sink);
        self
    }

    /// Native markup assignment.
    #[must_use]
    pub fn with_markup(mut self, sink: Arc<dyn MarkupSink>) -> Self {
        self.markup = Some(sink);
        self
    }

    /// Native beacon transmission.
    #[must_use]
    pub fn with_beacon(mut self, sink: Arc<dyn BeaconSink>) -> Self {
        self.beacon = Some(sink);
        self
    }

    /// Native request dispatch.
    #[must_use]
    pub fn with_requests(mut self, sink: Arc<dyn RequestSink>) -> Self {
        self.requests = Some(sink);
        self
    }

    /// Native image constructor.
    #[must_use]
    pub fn with_images(mut self, factory: Arc<dyn ImageFactory>) -> Self {
        self.images = Some(factory);
        self
    }

    /// Host document used for the shim detection.
    #[must_use]
    pub fn with_document(mut self, document: Arc<dyn Document>) -> Self {
        self.document = Some(document);
        self
    }
}
