//! Compatibility shim for hosts whose native attribute-change notification
//! does not fire on programmatic mutation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::host::{AttributeSink, Document};

/// Attribute written and removed on the document element during detection.
pub const DETECTION_ATTRIBUTE: &str = "___TEST___";

/// How attribute mutations are applied on this host. Chosen once at install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShimMode {
    /// Mutate immediately; the host notifies observers itself.
    Native,
    /// Dispatch a synthetic [`AttributeChange`] and defer the real mutation.
    Shimmed,
}

impl fmt::Display for ShimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Shimmed => write!(f, "shimmed"),
        }
    }
}

impl ShimMode {
    /// Detect how the host reports attribute changes.
    ///
    /// Shimmed only when the host has no mutation observer and a test
    /// mutation on the document element produces no change notification.
    /// Without a document there is nothing to test and the mode is native.
    pub fn detect(document: Option<&dyn Document>, natives: &dyn AttributeSink) -> Self {
        let Some(document) = document else {
            return Self::Native;
        };
        if document.has_mutation_observer() {
            return Self::Native;
        }

        let root = document.document_element();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let listener = root.add_change_listener(Arc::new(move |_| {
            flag.store(true, Ordering::SeqCst);
        }));

        if let Err(e) = natives.set_attribute(root.as_ref(), DETECTION_ATTRIBUTE, "true") {
            warn!(error = %e, "Shim detection mutation failed");
        }
        if let Err(e) = natives.remove_attribute(root.as_ref(), DETECTION_ATTRIBUTE) {
            warn!(error = %e, "Shim detection cleanup failed");
        }
        root.remove_change_listener(listener);

        let mode = if fired.load(Ordering::SeqCst) {
            Self::Native
        } else {
            Self::Shimmed
        };
        debug!(mode = %mode, "Attribute notification detection finished");
        mode
    }
}

/// Classification of an attribute change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The attribute did not exist before.
    Addition,
    /// The attribute existed and its value changed.
    Modification,
    /// The attribute was removed.
    Removal,
}

/// Attribute change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute name.
    pub attribute: String,
    /// Value before the change.
    pub previous: Option<String>,
    /// Value after the change (`None` on removal).
    pub new: Option<String>,
    /// Kind of change.
    pub kind: ChangeKind,
}

impl AttributeChange {
    /// Describe a change, or `None` when the value does not change.
    #[must_use]
    pub fn between(attribute: &str, previous: Option<&str>, new: Option<&str>) -> Option<Self> {
        if previous == new {
            return None;
        }
        let kind = match (previous, new) {
            (_, None) => ChangeKind::Removal,
            (None, Some(_)) => ChangeKind::Addition,
            (Some(_), Some(_)) => ChangeKind::Modification,
        };
        Some(Self {
            attribute: attribute.to_string(),
            previous: previous.map(str::to_string),
            new: new.map(str::to_string),
            kind,
        })
    }
}
