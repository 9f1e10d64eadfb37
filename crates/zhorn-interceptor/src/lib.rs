//! Zhorn Interceptor - sink interception and policy enforcement engine.
//!
//! A [`Guard`] wraps the host's native sinks once, in a [`SinkRegistry`],
//! and runs every guarded call through vetting, the intent bus, and (for
//! inclusions) the content sanitizer before forwarding to the captured
//! native. Blocked calls never reach the native sink.
//!
//! # Example
//!
//! ```
//! use zhorn_interceptor::prelude::*;
//!
//! let guard = Guard::new(HostSinks::new());
//! let handle = guard.activate(PolicyConfig::new(["https://a.example.com/collect"]));
//!
//! assert!(guard.send_beacon("https://a.example.com/collect", None).is_ok());
//!
//! let err = guard.send_beacon("https://evil.example.com/x", None).unwrap_err();
//! assert!(err.is_blocked());
//!
//! handle.destroy();
//! assert!(guard.send_beacon("https://a.example.com/collect", None).is_err());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod activation;
mod deferred;
mod guard;
pub mod host;
mod image;
mod registry;
pub mod shim;
mod subscribers;

pub use activation::{GuardHandle, PolicyConfig};
pub use deferred::{DeferredQueue, TaskId};
pub use guard::{DEFAULT_GUARDED_ATTRIBUTES, Guard, GuardBuilder, WeakGuard};
pub use host::{
    AttributeSink, BeaconSink, ChangeListener, DetachedImage, Document, Element, HostResponse,
    HostSinks, ImageFactory, ImageResource, ListenerId, MarkupSink, NativeAttributes,
    NativeMarkup, NoopSink, OutboundRequest, RequestSink,
};
pub use image::GuardedImage;
pub use registry::{NativeSink, PatchRecord, SinkRegistry};
pub use shim::{AttributeChange, ChangeKind, DETECTION_ATTRIBUTE, ShimMode};
