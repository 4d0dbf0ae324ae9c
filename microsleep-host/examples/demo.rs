use std::time::Instant;

use log::info;
use microsleep::Microsleep;
use microsleep_host::{HostPort, spawn};
use static_cell::StaticCell;

static MICROSLEEP: StaticCell<Microsleep<HostPort>> = StaticCell::new();

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let microsleep: &'static _ = MICROSLEEP.init(Microsleep::new(HostPort::default()));

    let calibrator = spawn(microsleep, move || microsleep.calibrate());
    let compensation = calibrator
        .join()
        .unwrap()
        .expect("Calibration failed");
    info!("Compensation: {} us", compensation);

    let tasks: Vec<_> = [50, 500, 5_000]
        .into_iter()
        .map(|us| {
            spawn(microsleep, move || {
                for _ in 0..3 {
                    let start = Instant::now();
                    microsleep.delay(us).expect("Delay failed");
                    info!("delay({}) took {} us", us, start.elapsed().as_micros());
                }
            })
        })
        .collect();

    for task in tasks {
        task.join().unwrap();
    }

    info!("Timers left: {}", microsleep.port().live_timers());
}
