//! Deterministic port for unit tests.
//!
//! Time only advances when the code under test waits, and alarms fire synchronously inside
//! `start_once`, so a task never needs to actually park.

use std::sync::{Mutex, PoisonError};

use crate::{
    Error, Microsleep,
    bridge::WakeTarget,
    port::{Port, TaskId},
};

pub(crate) struct MockTimer {
    target: WakeTarget,
    running: bool,
}

pub(crate) struct MockState {
    pub task: TaskId,
    pub in_task: bool,
    /// Fake clock in microseconds
    pub now: u64,
    /// Added to every alarm on top of its timeout
    pub overhead_us: u64,
    pub create_latency_us: u64,
    pub capacity: usize,
    pub fire_on_arm: bool,
    pub reject_arm: bool,
    pub timers: Vec<Option<MockTimer>>,
    pub arms: Vec<u64>,
    pub spins: Vec<u64>,
    pub unparks: Vec<TaskId>,
    pub created: usize,
    pub deleted: usize,
}

impl MockState {
    pub fn live_timers(&self) -> usize {
        self.timers.iter().filter(|timer| timer.is_some()).count()
    }
}

pub(crate) struct MockPort {
    state: Mutex<MockState>,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                task: 0,
                in_task: true,
                now: 0,
                overhead_us: 0,
                create_latency_us: 0,
                capacity: 16,
                fire_on_arm: true,
                reject_arm: false,
                timers: Vec::new(),
                arms: Vec::new(),
                spins: Vec::new(),
                unparks: Vec::new(),
                created: 0,
                deleted: 0,
            }),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl Port for MockPort {
    type Timer = usize;

    const ISR_DISPATCH: bool = true;

    fn create_timer(&self, target: WakeTarget) -> Result<usize, Error> {
        self.with(|state| {
            state.now += state.create_latency_us;
            if state.live_timers() >= state.capacity {
                return Err(Error::ResourceCreationFailed);
            }
            state.timers.push(Some(MockTimer {
                target,
                running: false,
            }));
            state.created += 1;
            Ok(state.timers.len() - 1)
        })
    }

    fn start_once(&self, timer: usize, timeout_us: u64) -> Result<(), Error> {
        let target = self.with(|state| {
            if state.reject_arm {
                return Err(Error::TimerArmFailed);
            }
            let fire_on_arm = state.fire_on_arm;
            let Some(Some(hw)) = state.timers.get_mut(timer) else {
                return Err(Error::TimerArmFailed);
            };
            if hw.running {
                return Err(Error::InvalidState);
            }
            let target = hw.target;
            hw.running = !fire_on_arm;
            state.arms.push(timeout_us);
            if fire_on_arm {
                state.now += timeout_us + state.overhead_us;
                Ok(Some(target))
            } else {
                Ok(None)
            }
        })?;

        // Outside of the lock, as the bridge calls back into the port
        if let Some(target) = target {
            target.fire();
        }

        Ok(())
    }

    fn cancel_timer(&self, timer: usize) {
        self.with(|state| {
            if let Some(Some(hw)) = state.timers.get_mut(timer) {
                hw.running = false;
            }
        });
    }

    fn delete_timer(&self, timer: usize) {
        self.with(|state| {
            if let Some(slot) = state.timers.get_mut(timer)
                && slot.take().is_some()
            {
                state.deleted += 1;
            }
        });
    }

    fn current_task(&self) -> Result<TaskId, Error> {
        self.with(|state| {
            if state.in_task {
                Ok(state.task)
            } else {
                Err(Error::NoCurrentTask)
            }
        })
    }

    fn park(&self) {
        panic!("the task would sleep forever");
    }

    fn unpark_from_isr(&self, task: TaskId) -> bool {
        self.with(|state| state.unparks.push(task));
        false
    }

    fn now_us(&self) -> u64 {
        self.with(|state| state.now)
    }

    fn busy_wait_us(&self, us: u64) {
        self.with(|state| {
            state.spins.push(us);
            state.now += us;
        });
    }
}

pub(crate) fn leak(port: MockPort) -> &'static Microsleep<MockPort> {
    leak_with(port, 0)
}

pub(crate) fn leak_with(port: MockPort, compensation_us: u64) -> &'static Microsleep<MockPort> {
    Box::leak(Box::new(Microsleep::with_compensation(port, compensation_us)))
}
