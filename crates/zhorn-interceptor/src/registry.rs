//! Wrapper registry: one patch record per guarded sink category.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use zhorn_core::SinkCategory;

use crate::host::{
    AttributeSink, BeaconSink, HostSinks, ImageFactory, MarkupSink, NativeAttributes, NativeMarkup,
    NoopSink, RequestSink,
};
use crate::shim::ShimMode;

/// The original, unguarded sink captured at install time.
#[derive(Clone)]
pub enum NativeSink {
    /// Attribute mutation.
    Attributes(Arc<dyn AttributeSink>),
    /// Beacon transmission.
    Beacon(Arc<dyn BeaconSink>),
    /// Asynchronous requests.
    Requests(Arc<dyn RequestSink>),
    /// Image construction.
    Images(Arc<dyn ImageFactory>),
    /// Markup assignment.
    Markup(Arc<dyn MarkupSink>),
}

impl NativeSink {
    /// Whether both handles refer to the same native object.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Attributes(a), Self::Attributes(b)) => Arc::ptr_eq(a, b),
            (Self::Beacon(a), Self::Beacon(b)) => Arc::ptr_eq(a, b),
            (Self::Requests(a), Self::Requests(b)) => Arc::ptr_eq(a, b),
            (Self::Images(a), Self::Images(b)) => Arc::ptr_eq(a, b),
            (Self::Markup(a), Self::Markup(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for NativeSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Attributes(_) => "Attributes",
            Self::Beacon(_) => "Beacon",
            Self::Requests(_) => "Requests",
            Self::Images(_) => "Images",
            Self::Markup(_) => "Markup",
        };
        write!(f, "NativeSink::{name}")
    }
}

/// What was captured when a sink category was wrapped.
#[derive(Debug)]
pub struct PatchRecord {
    category: SinkCategory,
    native: NativeSink,
    shim: ShimMode,
    installed_at: DateTime<Utc>,
}

impl PatchRecord {
    /// Sink category.
    #[must_use]
    pub fn category(&self) -> SinkCategory {
        self.category
    }

    /// The captured native sink.
    #[must_use]
    pub fn native(&self) -> &NativeSink {
        &self.native
    }

    /// Shim mode; always [`ShimMode::Native`] outside attribute inclusion.
    #[must_use]
    pub fn shim(&self) -> ShimMode {
        self.shim
    }

    /// When the record was created.
    #[must_use]
    pub fn installed_at(&self) -> DateTime<Utc> {
        self.installed_at
    }
}

/// Registry of installed wrappers, keyed by sink category.
#[derive(Debug, Default)]
pub struct SinkRegistry {
    records: RwLock<HashMap<SinkCategory, Arc<PatchRecord>>>,
}

impl SinkRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap every category not already wrapped.
    ///
    /// Categories that already have a record keep it untouched, so
    /// installing twice never stacks a second wrapper over the first.
    /// Returns the number of categories newly wrapped.
    pub fn install(&self, host: &HostSinks) -> usize {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut installed = 0usize;
        for category in SinkCategory::ALL {
            if records.contains_key(&category) {
                debug!(category = %category, "Sink already wrapped, keeping original");
                continue;
            }

            let (native, shim) = Self::capture(category, host);
            debug!(category = %category, native = ?native, shim = %shim, "Sink wrapped");
            records.insert(
                category,
                Arc::new(PatchRecord {
                    category,
                    native,
                    shim,
                    installed_at: Utc::now(),
                }),
            );
            installed = installed.saturating_add(1);
        }

        if installed > 0 {
            info!(installed, "Sink wrappers installed");
        }
        installed
    }

    fn capture(category: SinkCategory, host: &HostSinks) -> (NativeSink, ShimMode) {
        match category {
            SinkCategory::AttributeInclusion => {
                let natives: Arc<dyn AttributeSink> = host
                    .attributes
                    .clone()
                    .unwrap_or_else(|| Arc::new(NativeAttributes));
                let shim = ShimMode::detect(host.document.as_deref(), natives.as_ref());
                (NativeSink::Attributes(natives), shim)
            },
            SinkCategory::Beacon => (
                NativeSink::Beacon(host.beacon.clone().unwrap_or_else(|| {
                    debug!("Host has no beacon sink, recording no-op");
                    Arc::new(NoopSink)
                })),
                ShimMode::Native,
            ),
            SinkCategory::AsyncRequest => (
                NativeSink::Requests(host.requests.clone().unwrap_or_else(|| {
                    debug!("Host has no request sink, recording no-op");
                    Arc::new(NoopSink)
                })),
                ShimMode::Native,
            ),
            SinkCategory::ImageLoad => (
                NativeSink::Images(host.images.clone().unwrap_or_else(|| {
                    debug!("Host has no image constructor, recording no-op");
                    Arc::new(NoopSink)
                })),
                ShimMode::Native,
            ),
            SinkCategory::MarkupInjection => {
                let natives: Arc<dyn MarkupSink> =
                    host.markup.clone().unwrap_or_else(|| Arc::new(NativeMarkup));
                (NativeSink::Markup(natives), ShimMode::Native)
            },
        }
    }

    /// Remove every wrapper and hand back the original sinks.
    ///
    /// Guarded calls made after this fail with
    /// [`HostError::Unavailable`](zhorn_core::HostError::Unavailable)
    /// until the registry is installed again.
    pub fn restore(&self) -> Vec<Arc<PatchRecord>> {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let restored: Vec<_> = records.drain().map(|(_, record)| record).collect();
        info!(restored = restored.len(), "Sink wrappers removed");
        restored
    }

    /// The record for a category.
    #[must_use]
    pub fn record(&self, category: SinkCategory) -> Option<Arc<PatchRecord>> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(&category).cloned())
    }

    /// Whether a category is wrapped.
    #[must_use]
    pub fn is_installed(&self, category: SinkCategory) -> bool {
        self.record(category).is_some()
    }

    pub(crate) fn attributes(&self) -> Option<(Arc<dyn AttributeSink>, ShimMode)> {
        let record = self.record(SinkCategory::AttributeInclusion)?;
        match &record.native {
            NativeSink::Attributes(sink) => Some((Arc::clone(sink), record.shim)),
            _ => None,
        }
    }

    pub(crate) fn beacon(&self) -> Option<Arc<dyn BeaconSink>> {
        match self.record(SinkCategory::Beacon)?.native() {
            NativeSink::Beacon(sink) => Some(Arc::clone(sink)),
            _ => None,
        }
    }

    pub(crate) fn requests(&self) -> Option<Arc<dyn RequestSink>> {
        match self.record(SinkCategory::AsyncRequest)?.native() {
            NativeSink::Requests(sink) => Some(Arc::clone(sink)),
            _ => None,
        }
    }

    pub(crate) fn images(&self) -> Option<Arc<dyn ImageFactory>> {
        match self.record(SinkCategory::ImageLoad)?.native() {
            NativeSink::Images(factory) => Some(Arc::clone(factory)),
            _ => None,
        }
    }

    pub(crate) fn markup(&self) -> Option<Arc<dyn MarkupSink>> {
        match self.record(SinkCategory::MarkupInjection)?.native() {
            NativeSink::Markup(sink) => Some(Arc::clone(sink)),
            _ => None,
        }
    }
}
