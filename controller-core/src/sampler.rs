//! Comparator-driven delay sampler ("poor man's ADC").
//!
//! There is no converter on the board, only a single comparator whose second
//! input is a programmable reference ladder. Stepping the ladder upwards and
//! watching for the comparator to flip gives a coarse reading of the control
//! voltage set on the grace-period potentiometer.
//!
//! The sweep counts every ladder step it evaluates, including the one where
//! the comparator flips. A crossing on level 0 therefore reads as 1 and a
//! control voltage above the whole ladder reads as 16; 0 is never produced.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use crate::config::{ControllerConfig, LADDER_STEPS};
use crate::signals::{SignalError, SignalLine};

/// Programmable reference voltage feeding the comparator.
pub trait ReferenceLadder {
    /// Selects ladder level `level` (`0..LADDER_STEPS`).
    fn select(&mut self, level: u8);
}

impl<T: ReferenceLadder + ?Sized> ReferenceLadder for &mut T {
    fn select(&mut self, level: u8) {
        T::select(self, level);
    }
}

/// Sampled grace-period setting, in countdown ticks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct DelayLevel(u8);

impl DelayLevel {
    /// Reading for a crossing on the first ladder step.
    pub const MIN: Self = Self(1);
    /// Reading when the comparator never flips.
    pub const MAX: Self = Self(LADDER_STEPS);

    /// Clamps `raw` into the range a sweep can produce.
    #[must_use]
    pub const fn saturating(raw: u8) -> Self {
        if raw < Self::MIN.0 {
            Self::MIN
        } else if raw > Self::MAX.0 {
            Self::MAX
        } else {
            Self(raw)
        }
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<DelayLevel> for u8 {
    fn from(level: DelayLevel) -> Self {
        level.0
    }
}

impl fmt::Display for DelayLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Details of a single ladder sweep.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SampleTrace {
    pub level: DelayLevel,
    /// Ladder level left selected when the sweep stopped.
    pub last_reference: u8,
    /// `false` when the sweep ran off the top of the ladder.
    pub crossed: bool,
}

/// Voltage range of the reference ladder, mirroring the two ranges of the
/// on-chip generator on the reference board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LadderRange {
    /// `level / 24 * vdd`.
    Low,
    /// `vdd / 4 + level / 32 * vdd`.
    High,
}

impl LadderRange {
    /// Reference voltage produced at `level` for a supply of `vdd_mv`.
    #[must_use]
    pub fn reference_millivolts(self, level: u8, vdd_mv: u32) -> u32 {
        let level = u32::from(level.min(LADDER_STEPS - 1));
        match self {
            LadderRange::Low => vdd_mv * level / 24,
            LadderRange::High => vdd_mv * (8 + level) / 32,
        }
    }
}

/// Sweeps a [`ReferenceLadder`] against a comparator output.
///
/// The comparator pin reads high once the reference has risen past the
/// control voltage.
pub struct DelaySampler<L, C, D> {
    ladder: L,
    comparator: C,
    delay: D,
    settle_ns: u32,
}

impl<L, C, D> DelaySampler<L, C, D>
where
    L: ReferenceLadder,
    C: InputPin,
    D: DelayNs,
{
    /// Creates a sampler using the reference board's settle timing.
    pub fn new(ladder: L, comparator: C, delay: D) -> Self {
        Self::with_config(ladder, comparator, delay, &ControllerConfig::DEFAULT)
    }

    pub fn with_config(ladder: L, comparator: C, delay: D, config: &ControllerConfig) -> Self {
        Self {
            ladder,
            comparator,
            delay,
            settle_ns: config.step_settle_ns(),
        }
    }

    /// Samples the configured grace period.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the comparator pin cannot be read.
    pub fn sample(&mut self) -> Result<DelayLevel, SignalError> {
        self.sample_traced().map(|trace| trace.level)
    }

    /// Samples the configured grace period and reports how the sweep ended.
    ///
    /// Busy-waits for the settle time after every step; interrupts stay live.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the comparator pin cannot be read.
    pub fn sample_traced(&mut self) -> Result<SampleTrace, SignalError> {
        let mut steps: u8 = 0;
        let crossed = loop {
            self.ladder.select(steps);
            self.delay.delay_ns(self.settle_ns);
            steps += 1;

            // The top step is never compared; the sweep saturates there.
            if steps >= LADDER_STEPS {
                break false;
            }
            if self
                .comparator
                .is_high()
                .map_err(SignalError::on(SignalLine::Comparator))?
            {
                break true;
            }
        };

        Ok(SampleTrace {
            level: DelayLevel(steps),
            last_reference: steps - 1,
            crossed,
        })
    }

    /// Returns the owned peripherals.
    pub fn release(self) -> (L, C, D) {
        (self.ladder, self.comparator, self.delay)
    }
}
