//! Non-blocking exclusive access to the plugin object.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set while one call holds `&mut` access to the plugin.
///
/// Acquisition never blocks: a second caller, whether another thread or a
/// reentrant call on the same thread, is turned away and answers with a
/// safe default instead.
#[derive(Debug, Default)]
pub(crate) struct BusyFlag(AtomicBool);

pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl BusyFlag {
    pub(crate) fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| BusyGuard(&self.0))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
