//! Single-slot notification posted from interrupt context and consumed by one task.

use core::sync::atomic::Ordering;

use portable_atomic::AtomicBool;

/// Similar to a binary semaphore, but realized without a wait queue.
/// There is at most one waiter, and it brings its own way of suspending (see [`Signal::wait`]).
pub struct Signal {
    pending: AtomicBool,
}

impl Signal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Posts the notification. Never blocks, so it is usable from interrupt context.
    ///
    /// Raising an already pending signal keeps a single notification and returns `false`.
    pub fn raise(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }

    /// Consumes the pending notification, if any.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Calls `park` until a notification is consumed.
    pub fn wait(&self, mut park: impl FnMut()) {
        // `park` is allowed to return without a notification
        while !self.take() {
            park();
        }
    }

    pub(crate) fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
