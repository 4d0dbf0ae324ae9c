//! Interrupt-context half of a delay: hands the expiry of a task's timer over to that task.

use core::fmt;

use crate::{
    Microsleep,
    port::{Port, TaskId},
    trace,
};

/// Receiver of timer expiries, called in interrupt context.
pub trait WakeBridge: Sync {
    /// Must complete in bounded time: no blocking, no allocation.
    fn on_alarm(&self, task: TaskId);
}

/// Callback argument bound to a task's timer when it is created.
#[derive(Clone, Copy)]
pub struct WakeTarget {
    bridge: &'static dyn WakeBridge,
    task: TaskId,
}

impl WakeTarget {
    pub fn new(bridge: &'static dyn WakeBridge, task: TaskId) -> Self {
        Self { bridge, task }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// To be called by the timer interrupt handler of a port when the timer expires.
    pub fn fire(&self) {
        self.bridge.on_alarm(self.task);
    }
}

impl fmt::Debug for WakeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeTarget").field("task", &self.task).finish()
    }
}

impl<P: Port + 'static, const N: usize> WakeBridge for Microsleep<P, N> {
    fn on_alarm(&self, task: TaskId) {
        // If the task is not waiting, the notification stays pending until its next wait
        if !self.cache.notify(task) {
            // The task has been released in the meantime
            return;
        }

        trace!("Alarm for task #{}", task);

        if self.port().unpark_from_isr(task) {
            self.port().yield_from_isr();
        }
    }
}
