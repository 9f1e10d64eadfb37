//! Prelude module - commonly used types for convenient import.
//!
//! Use `use zhorn_interceptor::prelude::*;` to import all essential types.

// Engine
pub use crate::{Guard, GuardBuilder, GuardHandle, PolicyConfig, WeakGuard};

// Host capabilities
pub use crate::{
    AttributeSink, BeaconSink, Document, Element, HostResponse, HostSinks, ImageFactory,
    ImageResource, MarkupSink, OutboundRequest, RequestSink,
};

// Wrappers
pub use crate::{GuardedImage, NativeSink, PatchRecord, SinkRegistry};

// Shim
pub use crate::{AttributeChange, ChangeKind, ShimMode};

// Errors
pub use zhorn_core::{GuardError, GuardResult, HostError};
