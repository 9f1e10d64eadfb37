//! Typed decorator that guards an image's `src`.

use std::fmt;
use std::sync::Arc;

use zhorn_core::GuardResult;

use crate::guard::Guard;
use crate::host::ImageResource;

/// An image whose `src` setter runs through the guard. Every other property
/// is forwarded to the wrapped image unchanged.
pub struct GuardedImage {
    guard: Guard,
    inner: Arc<dyn ImageResource>,
}

impl fmt::Debug for GuardedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedImage")
            .field("src", &self.inner.src())
            .finish_non_exhaustive()
    }
}

impl GuardedImage {
    pub(crate) fn new(guard: Guard, inner: Arc<dyn ImageResource>) -> Self {
        Self { guard, inner }
    }
}

impl ImageResource for GuardedImage {
    fn src(&self) -> Option<String> {
        self.inner.src()
    }

    fn set_src(&self, src: &str) -> GuardResult<()> {
        self.guard.check_image_load(src)?;
        self.inner.set_src(src)
    }

    fn alt(&self) -> Option<String> {
        self.inner.alt()
    }

    fn set_alt(&self, alt: &str) -> GuardResult<()> {
        self.inner.set_alt(alt)
    }

    fn complete(&self) -> bool {
        self.inner.complete()
    }
}
