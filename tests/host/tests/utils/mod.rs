#![allow(dead_code)]

use std::time::Instant;

use microsleep::Microsleep;
use microsleep_host::{HostPort, spawn};

/// Upper bound of the extra latency tolerated from the OS scheduler of a loaded test machine.
pub const SLACK_US: u64 = 50_000;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Runs `f` as a task and waits for it to finish.
pub fn run_task<R, F>(microsleep: &'static Microsleep<HostPort>, f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    spawn(microsleep, f).join().expect("Task panicked")
}

pub fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// Delays the current task by `us` and returns how long it took.
pub fn timed_delay(microsleep: &'static Microsleep<HostPort>, us: u64) -> u64 {
    let start = Instant::now();
    microsleep.delay(us).expect("Delay failed");
    elapsed_us(start)
}
