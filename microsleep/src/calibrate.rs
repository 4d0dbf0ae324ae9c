//! Measurement of the delay overhead used as compensation.
//!
//! Arming a timer, taking the interrupt and switching back to the task costs a roughly constant
//! time on a given system. Calibration measures it on the calling task and stores the average,
//! which [`Microsleep::delay`] then subtracts from every timer-based delay.

use crate::{Error, Microsleep, info, port::Port};

const DEFAULT_ROUNDS: u32 = 10;
const DEFAULT_DURATION_US: u64 = 100;

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct CalibrationConfig {
    pub(crate) rounds: u32,
    pub(crate) duration_us: u64,
    pub(crate) warm_up: bool,
}

impl CalibrationConfig {
    /// Sets the number of measured delays. Default is 10. Zero is treated as one.
    pub fn with_rounds(self, rounds: u32) -> Self {
        Self { rounds, ..self }
    }

    /// Sets the length of each measured delay. Default is 100 µs.
    pub fn with_duration_us(self, duration_us: u64) -> Self {
        Self {
            duration_us,
            ..self
        }
    }

    /// Whether the timer of the task is created before the measurement starts. Default is `true`.
    ///
    /// Without it, the one-time cost of creating the timer inflates the first round.
    pub fn with_warm_up(self, warm_up: bool) -> Self {
        Self { warm_up, ..self }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            duration_us: DEFAULT_DURATION_US,
            warm_up: true,
        }
    }
}

/// Result of a calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Average overhead, rounded down. This is the new compensation.
    pub compensation_us: u64,
    pub min_overhead_us: u64,
    pub max_overhead_us: u64,
}

impl<P: Port + 'static, const N: usize> Microsleep<P, N> {
    /// Measures the delay overhead with the default configuration and makes it the compensation.
    ///
    /// Run it while the system is under its typical load. The compensation is shared by all
    /// tasks, but it is measured on the calling task only.
    pub fn calibrate(&'static self) -> Result<u64, Error> {
        self.calibrate_with(&CalibrationConfig::default())
            .map(|calibration| calibration.compensation_us)
    }

    pub fn calibrate_with(&'static self, config: &CalibrationConfig) -> Result<Calibration, Error> {
        if config.warm_up {
            self.acquire_timer()?;
        }

        let rounds = config.rounds.max(1);
        let mut total = 0u64;
        let mut min_overhead_us = u64::MAX;
        let mut max_overhead_us = 0;

        for _ in 0..rounds {
            let start = self.port().now_us();
            // Uncompensated, otherwise the result would only be the error of the previous calibration
            self.delay_compensated(config.duration_us, 0)?;
            let overhead = self
                .port()
                .now_us()
                .saturating_sub(start)
                .saturating_sub(config.duration_us);

            total = total.saturating_add(overhead);
            min_overhead_us = min_overhead_us.min(overhead);
            max_overhead_us = max_overhead_us.max(overhead);
        }

        let compensation_us = total / u64::from(rounds);
        self.compensation.set(compensation_us);

        info!(
            "Delay compensation calibrated: {} us (min {} us, max {} us)",
            compensation_us, min_overhead_us, max_overhead_us
        );

        Ok(Calibration {
            compensation_us,
            min_overhead_us,
            max_overhead_us,
        })
    }
}
