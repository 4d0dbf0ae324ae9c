//! Test that timers are released together with their tasks

mod utils;

use microsleep::Microsleep;
use microsleep_host::{HostPort, spawn};
use static_cell::StaticCell;

use crate::utils::{init_logger, run_task};

#[test]
fn timer_is_deleted_when_the_task_finishes() {
    init_logger();
    static MICROSLEEP: StaticCell<Microsleep<HostPort>> = StaticCell::new();
    let microsleep: &'static _ = MICROSLEEP.init(Microsleep::new(HostPort::default()));

    run_task(microsleep, move || {
        for _ in 0..3 {
            microsleep.delay(200).unwrap();
        }
        assert_eq!(microsleep.port().live_timers(), 1);
        assert_eq!(microsleep.timer_count(), 1);
    });

    let port = microsleep.port();
    assert_eq!(port.created_timers(), 1);
    assert_eq!(port.deleted_timers(), 1);
    assert_eq!(port.live_timers(), 0);
    assert_eq!(microsleep.timer_count(), 0);
}

#[test]
fn task_without_delays_owns_no_timer() {
    static MICROSLEEP: StaticCell<Microsleep<HostPort>> = StaticCell::new();
    let microsleep: &'static _ = MICROSLEEP.init(Microsleep::new(HostPort::default()));

    run_task(microsleep, move || microsleep.delay(0).unwrap());

    assert_eq!(microsleep.port().created_timers(), 0);
    assert_eq!(microsleep.port().deleted_timers(), 0);
}

#[test]
fn timer_is_deleted_when_the_task_panics() {
    init_logger();
    static MICROSLEEP: StaticCell<Microsleep<HostPort>> = StaticCell::new();
    let microsleep: &'static _ = MICROSLEEP.init(Microsleep::new(HostPort::default()));

    let result = spawn(microsleep, move || {
        microsleep.delay(200).unwrap();
        panic!("task failure");
    })
    .join();

    assert!(result.is_err());
    assert_eq!(microsleep.port().live_timers(), 0);
    assert_eq!(microsleep.timer_count(), 0);
}

#[test]
fn slots_are_reused_by_later_tasks() {
    init_logger();
    static MICROSLEEP: StaticCell<Microsleep<HostPort, 1>> = StaticCell::new();
    let microsleep: &'static _ = MICROSLEEP.init(Microsleep::new(HostPort::default()));

    for _ in 0..3 {
        spawn(microsleep, move || microsleep.delay(100).unwrap())
            .join()
            .unwrap();
    }

    assert_eq!(microsleep.port().created_timers(), 3);
    assert_eq!(microsleep.port().live_timers(), 0);
}
