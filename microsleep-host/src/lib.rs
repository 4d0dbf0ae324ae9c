//! Hosted port of [microsleep](microsleep).
//!
//! Tasks are OS threads started with [`spawn`]. The interrupt-capable hardware timer is emulated by a
//! dedicated thread that plays the role of the timer interrupt: it is the only thread that fires
//! alarms, and it never blocks while doing so.

use std::{
    cell::Cell,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle, Thread},
    time::{Duration, Instant},
};

use log::{debug, info, trace};
use microsleep::{
    Error, Microsleep,
    bridge::WakeTarget,
    port::{Port, TaskId},
};

const DEFAULT_TIMER_CAPACITY: usize = 16;

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct HostConfig {
    pub(crate) timer_capacity: usize,
    pub(crate) creation_latency: Duration,
}

impl HostConfig {
    /// Sets the number of hardware timers that can exist at the same time. Default is 16.
    pub fn with_timer_capacity(self, timer_capacity: usize) -> Self {
        Self {
            timer_capacity,
            ..self
        }
    }

    /// Sets an artificial cost of creating a timer. Default is zero.
    pub fn with_creation_latency(self, creation_latency: Duration) -> Self {
        Self {
            creation_latency,
            ..self
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            timer_capacity: DEFAULT_TIMER_CAPACITY,
            creation_latency: Duration::ZERO,
        }
    }
}

/// Handle of an emulated hardware timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostTimer {
    index: usize,
    /// Tells apart timers that reuse the index of a deleted one
    generation: u64,
}

struct HwTimer {
    target: WakeTarget,
    generation: u64,
    deadline: Option<Instant>,
}

#[derive(Default)]
struct TimerBank {
    timers: Vec<Option<HwTimer>>,
    arms: Vec<u64>,
    next_generation: u64,
    created: usize,
    deleted: usize,
    shutdown: bool,
}

impl TimerBank {
    fn get_mut(&mut self, timer: HostTimer) -> Option<&mut HwTimer> {
        self.timers
            .get_mut(timer.index)?
            .as_mut()
            .filter(|hw| hw.generation == timer.generation)
    }

    fn live(&self) -> usize {
        self.timers.iter().filter(|hw| hw.is_some()).count()
    }

    /// Disarms the earliest expired timer and returns whom to wake.
    fn take_expired(&mut self, now: Instant) -> Option<WakeTarget> {
        let hw = self
            .timers
            .iter_mut()
            .flatten()
            .filter(|hw| hw.deadline.is_some_and(|deadline| deadline <= now))
            .min_by_key(|hw| hw.deadline)?;
        hw.deadline = None;
        Some(hw.target)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .iter()
            .flatten()
            .filter_map(|hw| hw.deadline)
            .min()
    }
}

#[derive(Default)]
struct TaskTable {
    threads: Vec<Option<Thread>>,
    notifications: Vec<usize>,
}

struct Shared {
    config: HostConfig,
    epoch: Instant,
    bank: Mutex<TimerBank>,
    alarm: Condvar,
    tasks: Mutex<TaskTable>,
}

impl Shared {
    fn bank(&self) -> MutexGuard<'_, TimerBank> {
        self.bank.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, TaskTable> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct HostPort {
    shared: Arc<Shared>,
    interrupt: Option<JoinHandle<()>>,
}

impl HostPort {
    pub fn new(config: HostConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            epoch: Instant::now(),
            bank: Mutex::new(TimerBank::default()),
            alarm: Condvar::new(),
            tasks: Mutex::new(TaskTable::default()),
        });

        let interrupt = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("microsleep-timer-isr".into())
                .spawn(move || run_timer_interrupt(&shared))
                .expect("Failed to start the timer interrupt thread")
        };

        Self {
            shared,
            interrupt: Some(interrupt),
        }
    }

    /// Number of timers currently existing.
    pub fn live_timers(&self) -> usize {
        self.shared.bank().live()
    }

    pub fn created_timers(&self) -> usize {
        self.shared.bank().created
    }

    pub fn deleted_timers(&self) -> usize {
        self.shared.bank().deleted
    }

    /// Timeouts of all arm requests accepted so far, in order.
    pub fn armed_timeouts(&self) -> Vec<u64> {
        self.shared.bank().arms.clone()
    }

    /// Number of wake-ups delivered to `task` since it started.
    pub fn notifications(&self, task: TaskId) -> usize {
        self.shared
            .tasks()
            .notifications
            .get(task)
            .copied()
            .unwrap_or(0)
    }

    /// Registers the calling thread as a task.
    fn enter_task(&self) -> TaskId {
        let mut tasks = self.shared.tasks();
        let task = match tasks.threads.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                tasks.threads.push(None);
                tasks.notifications.push(0);
                tasks.threads.len() - 1
            }
        };
        tasks.threads[task] = Some(thread::current());
        tasks.notifications[task] = 0;
        CURRENT_TASK.set(Some(task));

        info!("Task #{} started", task);
        task
    }

    fn exit_task(&self, task: TaskId) {
        if let Some(thread) = self.shared.tasks().threads.get_mut(task) {
            *thread = None;
        }
        CURRENT_TASK.set(None);

        info!("Task #{} finished", task);
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Drop for HostPort {
    fn drop(&mut self) {
        self.shared.bank().shutdown = true;
        self.shared.alarm.notify_all();
        if let Some(interrupt) = self.interrupt.take() {
            let _ = interrupt.join();
        }
    }
}

impl Port for HostPort {
    type Timer = HostTimer;

    const ISR_DISPATCH: bool = true;

    fn create_timer(&self, target: WakeTarget) -> Result<HostTimer, Error> {
        let latency = self.shared.config.creation_latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let mut bank = self.shared.bank();
        if bank.live() >= self.shared.config.timer_capacity {
            return Err(Error::ResourceCreationFailed);
        }

        let generation = bank.next_generation;
        bank.next_generation += 1;
        let hw = HwTimer {
            target,
            generation,
            deadline: None,
        };

        let index = match bank.timers.iter().position(Option::is_none) {
            Some(free) => {
                bank.timers[free] = Some(hw);
                free
            }
            None => {
                bank.timers.push(Some(hw));
                bank.timers.len() - 1
            }
        };
        bank.created += 1;

        debug!("Hardware timer {} created for task #{}", index, target.task());

        Ok(HostTimer { index, generation })
    }

    fn start_once(&self, timer: HostTimer, timeout_us: u64) -> Result<(), Error> {
        let deadline = Instant::now()
            .checked_add(Duration::from_micros(timeout_us))
            .ok_or(Error::TimerArmFailed)?;

        let mut bank = self.shared.bank();
        let hw = bank.get_mut(timer).ok_or(Error::TimerArmFailed)?;
        if hw.deadline.is_some() {
            return Err(Error::InvalidState);
        }
        hw.deadline = Some(deadline);
        bank.arms.push(timeout_us);
        drop(bank);

        self.shared.alarm.notify_one();

        Ok(())
    }

    fn cancel_timer(&self, timer: HostTimer) {
        if let Some(hw) = self.shared.bank().get_mut(timer) {
            hw.deadline = None;
        }
    }

    fn delete_timer(&self, timer: HostTimer) {
        let mut bank = self.shared.bank();
        if bank.get_mut(timer).is_some() {
            bank.timers[timer.index] = None;
            bank.deleted += 1;
            debug!("Hardware timer {} deleted", timer.index);
        }
    }

    fn current_task(&self) -> Result<TaskId, Error> {
        CURRENT_TASK.get().ok_or(Error::NoCurrentTask)
    }

    fn park(&self) {
        thread::park();
    }

    fn unpark_from_isr(&self, task: TaskId) -> bool {
        let mut tasks = self.shared.tasks();
        let TaskTable {
            threads,
            notifications,
        } = &mut *tasks;
        if let Some(Some(thread)) = threads.get(task) {
            notifications[task] += 1;
            thread.unpark();
        }

        // Preemption is up to the OS scheduler
        false
    }

    fn now_us(&self) -> u64 {
        u64::try_from(self.shared.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn busy_wait_us(&self, us: u64) {
        let deadline = self.now_us().saturating_add(us);
        while self.now_us() < deadline {
            core::hint::spin_loop();
        }
    }
}

/// Body of the thread emulating the timer interrupt.
fn run_timer_interrupt(shared: &Shared) {
    let mut bank = shared.bank();

    while !bank.shutdown {
        let now = Instant::now();

        if let Some(target) = bank.take_expired(now) {
            // Released while the alarm is delivered, like a real ISR does not hold driver locks
            drop(bank);
            trace!("Timer fired for task #{}", target.task());
            target.fire();
            bank = shared.bank();
            continue;
        }

        bank = match bank.next_deadline() {
            Some(deadline) => {
                shared
                    .alarm
                    .wait_timeout(bank, deadline.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .alarm
                .wait(bank)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}

/// Spawns `f` as a task on the port of `microsleep`.
///
/// When `f` returns or panics, the timer of the task is released.
pub fn spawn<F, R, const N: usize>(
    microsleep: &'static Microsleep<HostPort, N>,
    f: F,
) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::spawn(move || {
        let task = microsleep.port().enter_task();
        let _exit = TaskExit { microsleep, task };
        f()
    })
}

/// Teardown hook of a task, run on drop so that a panicking task is covered too.
struct TaskExit<const N: usize> {
    microsleep: &'static Microsleep<HostPort, N>,
    task: TaskId,
}

impl<const N: usize> Drop for TaskExit<N> {
    fn drop(&mut self) {
        self.microsleep.release_task(self.task);
        self.microsleep.port().exit_task(self.task);
    }
}
