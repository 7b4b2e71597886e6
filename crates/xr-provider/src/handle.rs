use std::fmt;
use std::sync::Arc;

use openxr::sys;
use tracing::{trace, warn};

use crate::runtime::{XrResult, XrRuntime};

/// A runtime handle type that must be destroyed through the runtime.
pub trait Releasable: Copy + fmt::Debug + Send + Sync + 'static {
    const KIND: &'static str;

    fn release(self, runtime: &dyn XrRuntime) -> XrResult<()>;
}

impl Releasable for sys::Session {
    const KIND: &'static str = "session";

    fn release(self, runtime: &dyn XrRuntime) -> XrResult<()> {
        runtime.destroy_session(self)
    }
}

impl Releasable for sys::Space {
    const KIND: &'static str = "space";

    fn release(self, runtime: &dyn XrRuntime) -> XrResult<()> {
        runtime.destroy_space(self)
    }
}

impl Releasable for sys::Swapchain {
    const KIND: &'static str = "swapchain";

    fn release(self, runtime: &dyn XrRuntime) -> XrResult<()> {
        runtime.destroy_swapchain(self)
    }
}

impl Releasable for sys::ActionSet {
    const KIND: &'static str = "action set";

    fn release(self, runtime: &dyn XrRuntime) -> XrResult<()> {
        runtime.destroy_action_set(self)
    }
}

/// Owns one runtime handle and destroys it exactly once on drop.
pub struct Owned<H: Releasable> {
    raw: H,
    runtime: Arc<dyn XrRuntime>,
}

impl<H: Releasable> Owned<H> {
    pub fn new(runtime: Arc<dyn XrRuntime>, raw: H) -> Self {
        Self { raw, runtime }
    }

    /// Runs a creation call and takes ownership of the result.
    pub fn create(
        runtime: &Arc<dyn XrRuntime>,
        create: impl FnOnce(&dyn XrRuntime) -> XrResult<H>,
    ) -> XrResult<Self> {
        let raw = create(runtime.as_ref())?;
        Ok(Self::new(Arc::clone(runtime), raw))
    }

    pub fn raw(&self) -> H {
        self.raw
    }
}

impl<H: Releasable> fmt::Debug for Owned<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.raw).finish()
    }
}

impl<H: Releasable> Drop for Owned<H> {
    fn drop(&mut self) {
        match self.raw.release(self.runtime.as_ref()) {
            Ok(()) => trace!(kind = H::KIND, handle = ?self.raw, "released"),
            Err(err) => warn!(kind = H::KIND, handle = ?self.raw, "release failed: {err}"),
        }
    }
}
