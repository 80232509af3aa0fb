//! Scoped release of freshly allocated driver handles

use tracing::warn;

use crate::driver::{Driver, DriverResult, Handle, HandleType};

/// Owns a handle until it is committed to its final owner
///
/// Dropping an uncommitted guard frees the handle, so every early return
/// between allocation and commit unwinds the allocation.
pub(crate) struct HandleGuard<'d> {
    driver: &'d dyn Driver,
    kind: HandleType,
    handle: Handle,
    armed: bool,
}

impl<'d> HandleGuard<'d> {
    pub(crate) fn allocate(
        driver: &'d dyn Driver,
        kind: HandleType,
        parent: Option<Handle>,
    ) -> DriverResult<Self> {
        let handle = driver.allocate_handle(kind, parent)?;
        Ok(Self::adopt(driver, kind, handle))
    }

    /// Take responsibility for a handle allocated elsewhere
    pub(crate) fn adopt(driver: &'d dyn Driver, kind: HandleType, handle: Handle) -> Self {
        Self {
            driver,
            kind,
            handle,
            armed: true,
        }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    /// Hand the handle over; the guard no longer frees it
    pub(crate) fn commit(mut self) -> Handle {
        self.armed = false;
        self.handle
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(code) = self.driver.free_handle(self.kind, self.handle) {
            warn!(
                "Failed to release {:?} handle {} after aborted setup: {}",
                self.kind, self.handle, code
            );
        }
    }
}
