//! `embedded-hal`-compatible delay that sleeps the task on its own hardware timer.
//! Unlike a tick-based delay, the precision is on the order of microseconds.
use microsleep::{Error, Microsleep, port::Port};

pub struct Delay<P: Port + 'static, const N: usize = { microsleep::delay::DEFAULT_MAX_TASKS }> {
    microsleep: &'static Microsleep<P, N>,
}

impl<P: Port + 'static, const N: usize> Delay<P, N> {
    pub fn new(microsleep: &'static Microsleep<P, N>) -> Self {
        Self { microsleep }
    }

    /// Like [`DelayNs::delay_us`](embedded_hal::delay::DelayNs::delay_us), but reports failures.
    pub fn try_delay_us(&mut self, us: u64) -> Result<(), Error> {
        self.microsleep.delay(us)
    }

    fn delay_us_u64(&mut self, us: u64) {
        self.try_delay_us(us).expect("Failed to delay the task");
    }
}

impl<P: Port + 'static, const N: usize> Clone for Delay<P, N> {
    fn clone(&self) -> Self {
        Self {
            microsleep: self.microsleep,
        }
    }
}

impl<P: Port + 'static, const N: usize> embedded_hal::delay::DelayNs for Delay<P, N> {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_us_u64(u64::from(ns).div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_us_u64(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_us_u64(u64::from(ms) * 1_000);
    }
}
