//! Timing contract shared by the firmware and host targets.
//!
//! The reference board clocks its countdown from a 48 kHz oscillator through a
//! 1:64 prescaler into an 8-bit counter, so one overflow ("tick") lasts
//! `4 * 64 * 256 / 48_000` seconds. Other targets reproduce that period with
//! whatever timer they have and read it from here.

use core::time::Duration;

/// Instruction clock feeding the reference countdown (Hz).
pub const REFERENCE_OSCILLATOR_HZ: u64 = 48_000;
/// Oscillator cycles per counter increment (4 clocks per instruction, 1:64 prescaler).
pub const REFERENCE_CYCLES_PER_COUNT: u64 = 4 * 64;
/// Counter increments per overflow.
pub const REFERENCE_COUNTS_PER_OVERFLOW: u64 = 256;

/// Length of one countdown tick in microseconds (~1.365 s).
pub const TICK_PERIOD_MICROS: u64 = REFERENCE_CYCLES_PER_COUNT * REFERENCE_COUNTS_PER_OVERFLOW
    * 1_000_000
    / REFERENCE_OSCILLATOR_HZ;

/// Length of one countdown tick.
pub const TICK_PERIOD: Duration = Duration::from_micros(TICK_PERIOD_MICROS);

/// Settling time for the reference ladder after a level change.
pub const REFERENCE_SETTLE_US: u32 = 10;
/// Comparator output propagation delay.
pub const COMPARATOR_RESPONSE_US: u32 = 5;

/// Number of selectable reference ladder levels (0..=15).
pub const LADDER_STEPS: u8 = 16;

/// Wait after power-up before change interrupts are armed.
pub const STARTUP_SETTLE: Duration = Duration::from_millis(100);

/// Runtime view of the timing constants.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ControllerConfig {
    pub tick_period: Duration,
    pub reference_settle_us: u32,
    pub comparator_response_us: u32,
    pub startup_settle: Duration,
}

impl ControllerConfig {
    /// Timing of the reference hardware.
    pub const DEFAULT: Self = Self {
        tick_period: TICK_PERIOD,
        reference_settle_us: REFERENCE_SETTLE_US,
        comparator_response_us: COMPARATOR_RESPONSE_US,
        startup_settle: STARTUP_SETTLE,
    };

    /// Busy-wait applied after every ladder step, in nanoseconds.
    #[must_use]
    pub const fn step_settle_ns(&self) -> u32 {
        (self.reference_settle_us + self.comparator_response_us) * 1_000
    }

    /// Worst-case wall-clock time of one full ladder sweep.
    #[must_use]
    pub const fn max_sample_duration(&self) -> Duration {
        Duration::from_nanos(self.step_settle_ns() as u64 * LADDER_STEPS as u64)
    }

    /// Time between the countdown starting and power being cut for a given
    /// threshold. Power drops once the elapsed count exceeds the threshold,
    /// i.e. on tick `threshold + 1`.
    #[must_use]
    pub fn grace_period(&self, threshold: u8) -> Duration {
        self.tick_period * (u32::from(threshold) + 1)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_period_matches_reference_oscillator() {
        assert_eq!(TICK_PERIOD_MICROS, 1_365_333);
        assert_eq!(TICK_PERIOD.as_millis(), 1_365);
    }

    #[test]
    fn sampler_sweep_stays_under_quarter_millisecond() {
        let config = ControllerConfig::DEFAULT;
        assert_eq!(config.step_settle_ns(), 15_000);
        assert_eq!(config.max_sample_duration(), Duration::from_micros(240));
    }

    #[test]
    fn grace_period_spans_one_to_seventeen_ticks() {
        let config = ControllerConfig::default();
        assert_eq!(config.grace_period(0), TICK_PERIOD);
        assert_eq!(config.grace_period(5), TICK_PERIOD * 6);
        assert_eq!(config.grace_period(16).as_secs(), 23);
    }
}
