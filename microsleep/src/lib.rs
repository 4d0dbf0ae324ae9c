//! Microsecond-precision delays for tasks of a preemptive RTOS.
//!
//! The tick-based delay of an RTOS cannot sleep for less than a tick. [`Microsleep`] instead arms a
//! one-shot hardware timer owned by the calling task and suspends the task until the timer interrupt
//! wakes it. Requests shorter than the measured overhead of that round trip are busy-waited.
//!
//! The platform (scheduler, timer driver, clock) is supplied through the [`port::Port`] trait.

#![cfg_attr(not(test), no_std)]

mod log_wrapper;

pub mod bridge;
mod cache;
pub mod calibrate;
mod compensation;
pub mod delay;
pub mod port;
pub mod signal;

#[cfg(test)]
mod mock;

pub use delay::Microsleep;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No memory or hardware slot is left for a new per-task timer.
    ResourceCreationFailed,
    /// The timer is already running.
    InvalidState,
    /// The timer driver rejected the arm request.
    TimerArmFailed,
    /// Called outside of a task.
    NoCurrentTask,
}
