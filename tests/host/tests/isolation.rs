//! Test that concurrent delays of different tasks do not wake each other

mod utils;

use std::sync::{Arc, Barrier};

use microsleep::{Microsleep, port::Port};
use microsleep_host::{HostPort, spawn};
use static_cell::StaticCell;

use crate::utils::{SLACK_US, init_logger, timed_delay};

#[test]
fn each_task_is_woken_once_by_its_own_timer() {
    init_logger();
    static MICROSLEEP: StaticCell<Microsleep<HostPort>> = StaticCell::new();
    let microsleep: &'static _ = MICROSLEEP.init(Microsleep::new(HostPort::default()));

    let start = Arc::new(Barrier::new(2));
    let tasks: Vec<_> = [20_000, 3_000]
        .into_iter()
        .map(|us| {
            let start = start.clone();
            spawn(microsleep, move || {
                let task = microsleep.port().current_task().unwrap();
                microsleep.acquire_timer().unwrap();
                start.wait();

                let elapsed = timed_delay(microsleep, us);
                let notifications = microsleep.port().notifications(task);
                (us, elapsed, notifications)
            })
        })
        .collect();

    for task in tasks {
        let (us, elapsed, notifications) = task.join().unwrap();
        // The shorter delay expiring first must not end the longer one
        assert!(elapsed >= us, "delay({}) took {} us", us, elapsed);
        assert!(elapsed < us + SLACK_US, "delay({}) took {} us", us, elapsed);
        assert_eq!(notifications, 1, "delay({}) woken {} times", us, notifications);
    }

    assert_eq!(microsleep.port().created_timers(), 2);
}

#[test]
fn many_tasks_delay_concurrently() {
    init_logger();
    static MICROSLEEP: StaticCell<Microsleep<HostPort>> = StaticCell::new();
    let microsleep: &'static _ = MICROSLEEP.init(Microsleep::new(HostPort::default()));

    let tasks: Vec<_> = (1..=8u64)
        .map(|i| {
            spawn(microsleep, move || {
                (0..5)
                    .map(|_| timed_delay(microsleep, i * 500))
                    .all(|elapsed| elapsed >= i * 500)
            })
        })
        .collect();

    for task in tasks {
        assert!(task.join().unwrap());
    }

    // One timer per task, no matter how many delays
    assert_eq!(microsleep.port().created_timers(), 8);
    assert_eq!(microsleep.port().armed_timeouts().len(), 40);
}
