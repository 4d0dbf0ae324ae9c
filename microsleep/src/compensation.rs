use core::sync::atomic::Ordering;

use portable_atomic::AtomicU64;

/// Estimated overhead of the arm-interrupt-notify round trip, in microseconds.
///
/// Written by calibration only. Readers see either the old or the new value; a stale value
/// merely makes delays a little longer.
pub(crate) struct Compensation {
    us: AtomicU64,
}

impl Compensation {
    pub(crate) const fn new(us: u64) -> Self {
        Self {
            us: AtomicU64::new(us),
        }
    }

    pub(crate) fn get(&self) -> u64 {
        self.us.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, us: u64) {
        self.us.store(us, Ordering::Release);
    }
}
