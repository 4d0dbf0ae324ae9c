//! Interface for platform-dependent functions implemented in separate crates.
//!
//! A port ties the delay machinery to a concrete scheduler and timer peripheral.

use crate::{Error, bridge::WakeTarget};

/// Identity of a task as assigned by the host scheduler.
pub type TaskId = usize;

/// Services of the host RTOS and its interrupt-capable timer driver.
pub trait Port: Sync {
    /// Handle of a one-shot hardware timer, typically a pointer or an index into a driver table.
    type Timer: Copy + Send;

    /// Whether timer callbacks run directly in the interrupt handler.
    ///
    /// [`Microsleep`](crate::Microsleep) does not build for ports without interrupt-context dispatch.
    const ISR_DISPATCH: bool;

    /// Creates an idle one-shot timer that calls [`WakeTarget::fire`] from interrupt context on expiry.
    fn create_timer(&self, target: WakeTarget) -> Result<Self::Timer, Error>;

    /// Arms `timer` to fire once after `timeout_us` microseconds.
    ///
    /// Fails with [`Error::InvalidState`] if the timer is already running.
    fn start_once(&self, timer: Self::Timer, timeout_us: u64) -> Result<(), Error>;

    /// Stops `timer` if it is running.
    fn cancel_timer(&self, timer: Self::Timer);

    /// Releases `timer` and its interrupt source. A running timer is stopped first.
    fn delete_timer(&self, timer: Self::Timer);

    fn current_task(&self) -> Result<TaskId, Error>;

    /// Blocks the current task until [`Port::unpark_from_isr`] is called for it.
    ///
    /// May return spuriously.
    fn park(&self);

    /// Makes `task` runnable again. Called from interrupt context.
    ///
    /// Returns `true` if the woken task should preempt the interrupted one.
    fn unpark_from_isr(&self, task: TaskId) -> bool;

    /// Requests a context switch on interrupt exit.
    fn yield_from_isr(&self) {}

    /// Monotonic time in microseconds.
    fn now_us(&self) -> u64;

    /// Occupies the CPU for at least `us` microseconds.
    fn busy_wait_us(&self, us: u64);
}
