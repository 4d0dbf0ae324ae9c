//! Microsecond delays that suspend the calling task on a one-shot hardware timer.
//!
//! Each task gets its own timer, created on its first delay and cached until the task terminates.
//! Requests not longer than the measured overhead of the timer round trip (see [`crate::calibrate`])
//! are busy-waited instead.

use crate::{
    Error,
    bridge::WakeTarget,
    cache::{Lease, TimerCache},
    compensation::Compensation,
    debug,
    port::{Port, TaskId},
    trace,
};

/// Default number of tasks that can own a timer at the same time.
pub const DEFAULT_MAX_TASKS: usize = 16;

/// Delay dispatcher for up to `N` tasks with a timer.
///
/// Timer callbacks refer back to it, so it is used through a `&'static` reference
/// (e.g. kept in a `static` or a `StaticCell`).
pub struct Microsleep<P: Port, const N: usize = DEFAULT_MAX_TASKS> {
    port: P,
    pub(crate) cache: TimerCache<P::Timer, N>,
    pub(crate) compensation: Compensation,
}

impl<P: Port + 'static, const N: usize> Microsleep<P, N> {
    /// Creates a dispatcher with no compensation until [`Microsleep::calibrate`] runs.
    ///
    /// ```no_run
    /// # use microsleep::{Error, Microsleep, bridge::WakeTarget, port::{Port, TaskId}};
    /// struct TimerIsrPort;
    ///
    /// impl Port for TimerIsrPort {
    ///     type Timer = usize;
    ///     const ISR_DISPATCH: bool = true;
    /// #   fn create_timer(&self, _: WakeTarget) -> Result<usize, Error> { unimplemented!() }
    /// #   fn start_once(&self, _: usize, _: u64) -> Result<(), Error> { unimplemented!() }
    /// #   fn cancel_timer(&self, _: usize) {}
    /// #   fn delete_timer(&self, _: usize) {}
    /// #   fn current_task(&self) -> Result<TaskId, Error> { unimplemented!() }
    /// #   fn park(&self) {}
    /// #   fn unpark_from_isr(&self, _: TaskId) -> bool { false }
    /// #   fn now_us(&self) -> u64 { 0 }
    /// #   fn busy_wait_us(&self, _: u64) {}
    /// }
    ///
    /// static MICROSLEEP: Microsleep<TimerIsrPort> = Microsleep::new(TimerIsrPort);
    /// ```
    ///
    /// Timer drivers that defer callbacks to a task are rejected at compile time:
    ///
    /// ```compile_fail
    /// # use microsleep::{Error, Microsleep, bridge::WakeTarget, port::{Port, TaskId}};
    /// struct DeferredPort;
    ///
    /// impl Port for DeferredPort {
    ///     type Timer = usize;
    ///     const ISR_DISPATCH: bool = false;
    /// #   fn create_timer(&self, _: WakeTarget) -> Result<usize, Error> { unimplemented!() }
    /// #   fn start_once(&self, _: usize, _: u64) -> Result<(), Error> { unimplemented!() }
    /// #   fn cancel_timer(&self, _: usize) {}
    /// #   fn delete_timer(&self, _: usize) {}
    /// #   fn current_task(&self) -> Result<TaskId, Error> { unimplemented!() }
    /// #   fn park(&self) {}
    /// #   fn unpark_from_isr(&self, _: TaskId) -> bool { false }
    /// #   fn now_us(&self) -> u64 { 0 }
    /// #   fn busy_wait_us(&self, _: u64) {}
    /// }
    ///
    /// static MICROSLEEP: Microsleep<DeferredPort> = Microsleep::new(DeferredPort);
    /// ```
    ///
    /// So is a dispatcher without task slots:
    ///
    /// ```compile_fail
    /// # use microsleep::{Error, Microsleep, bridge::WakeTarget, port::{Port, TaskId}};
    /// struct TimerIsrPort;
    ///
    /// impl Port for TimerIsrPort {
    ///     type Timer = usize;
    ///     const ISR_DISPATCH: bool = true;
    /// #   fn create_timer(&self, _: WakeTarget) -> Result<usize, Error> { unimplemented!() }
    /// #   fn start_once(&self, _: usize, _: u64) -> Result<(), Error> { unimplemented!() }
    /// #   fn cancel_timer(&self, _: usize) {}
    /// #   fn delete_timer(&self, _: usize) {}
    /// #   fn current_task(&self) -> Result<TaskId, Error> { unimplemented!() }
    /// #   fn park(&self) {}
    /// #   fn unpark_from_isr(&self, _: TaskId) -> bool { false }
    /// #   fn now_us(&self) -> u64 { 0 }
    /// #   fn busy_wait_us(&self, _: u64) {}
    /// }
    ///
    /// static MICROSLEEP: Microsleep<TimerIsrPort, 0> = Microsleep::new(TimerIsrPort);
    /// ```
    pub const fn new(port: P) -> Self {
        Self::with_compensation(port, 0)
    }

    /// Starts with a compensation measured beforehand, e.g. by a calibration on a previous boot.
    pub const fn with_compensation(port: P, compensation_us: u64) -> Self {
        const {
            assert!(
                P::ISR_DISPATCH,
                "the timer driver must dispatch callbacks from interrupt context"
            )
        };
        const { assert!(N > 0, "at least one task slot is required") };

        Self {
            port,
            cache: TimerCache::new(),
            compensation: Compensation::new(compensation_us),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Current compensation in microseconds.
    pub fn compensation(&self) -> u64 {
        self.compensation.get()
    }

    /// Number of tasks currently owning a timer.
    pub fn timer_count(&self) -> usize {
        self.cache.len()
    }

    /// Blocks the current task for `us` microseconds.
    ///
    /// A zero delay returns immediately. Delays up to the current compensation are busy-waited,
    /// longer ones sleep on the task's timer, armed for `us` minus the compensation.
    pub fn delay(&'static self, us: u64) -> Result<(), Error> {
        self.delay_compensated(us, self.compensation.get())
    }

    pub(crate) fn delay_compensated(&'static self, us: u64, compensation: u64) -> Result<(), Error> {
        if us == 0 {
            return Ok(());
        }

        let lease = self.lease()?;

        if us <= compensation {
            trace!("Busy-waiting for {} us", us);
            self.port.busy_wait_us(us);
            return Ok(());
        }

        PendingDelay::arm(self, lease, us - compensation)?.wait();

        Ok(())
    }

    /// Returns the timer of the current task, creating it on first use.
    pub fn acquire_timer(&'static self) -> Result<P::Timer, Error> {
        self.lease().map(|lease| lease.timer)
    }

    fn lease(&'static self) -> Result<Lease<P::Timer>, Error> {
        let task = self.port.current_task()?;

        self.cache.acquire(
            task,
            || self.port.create_timer(WakeTarget::new(self, task)),
            |timer| self.port.delete_timer(timer),
        )
    }

    /// Deletes the timer owned by `task`, if any.
    ///
    /// Ports call this when a task terminates so that no hardware timer outlives its owner.
    pub fn release_task(&self, task: TaskId) {
        if let Some(timer) = self.cache.release(task) {
            self.port.cancel_timer(timer);
            self.port.delete_timer(timer);
            debug!("Timer of task #{} deleted", task);
        }
    }
}

/// An armed timer and the task about to wait for it. Lives on the waiting task's stack.
struct PendingDelay<'a, P: Port + 'static, const N: usize> {
    owner: &'a Microsleep<P, N>,
    slot: usize,
}

impl<'a, P: Port + 'static, const N: usize> PendingDelay<'a, P, N> {
    fn arm(
        owner: &'a Microsleep<P, N>,
        lease: Lease<P::Timer>,
        timeout_us: u64,
    ) -> Result<Self, Error> {
        owner.cache.arm(lease.slot)?;
        // Disarms on drop, also when the driver refuses
        let pending = Self {
            owner,
            slot: lease.slot,
        };

        owner.port.start_once(lease.timer, timeout_us)?;
        trace!("Timer armed for {} us", timeout_us);

        Ok(pending)
    }

    fn wait(self) {
        self.owner
            .cache
            .signal(self.slot)
            .wait(|| self.owner.port.park());
    }
}

impl<P: Port + 'static, const N: usize> Drop for PendingDelay<'_, P, N> {
    fn drop(&mut self) {
        self.owner.cache.disarm(self.slot);
    }
}
