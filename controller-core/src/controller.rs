//! Power state machine driven by the foreground loop.
//!
//! Each call to [`PowerController::poll`] is one iteration of the control
//! loop: it looks at the power-loss input, the freshly sampled threshold and
//! the countdown's elapsed count, and decides the level of the output line.
//! The countdown itself is only ever started from the change interrupt (see
//! [`crate::handlers::on_signal_change`]); the loop only stops it.

use embedded_hal::digital::OutputPin;

use crate::countdown::{SharedCountdown, TickCounter};
use crate::signals::{PowerLevel, SignalError, SignalLine, drive};

/// Conceptual phase of the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    /// Utility power present, device powered.
    PoweredNormal,
    /// Utility power lost, device kept alive from the backup supply.
    PoweredOnBackup,
    /// Grace period exceeded, device unpowered until utility power returns.
    PoweringDown,
}

impl PowerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PowerState::PoweredNormal => "powered-normal",
            PowerState::PoweredOnBackup => "powered-on-backup",
            PowerState::PoweringDown => "powering-down",
        }
    }

    /// Output level this state implies.
    #[must_use]
    pub const fn output(self) -> PowerLevel {
        match self {
            PowerState::PoweredNormal | PowerState::PoweredOnBackup => PowerLevel::On,
            PowerState::PoweringDown => PowerLevel::Off,
        }
    }
}

/// State change observed by a single poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerTransition {
    pub from: PowerState,
    pub to: PowerState,
}

/// Result of one foreground iteration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PollOutcome {
    pub state: PowerState,
    /// Elapsed ticks observed before any reset this iteration.
    pub elapsed: u8,
    pub threshold: u8,
    pub transition: Option<PowerTransition>,
}

impl PollOutcome {
    /// `true` when this iteration switched the device off.
    #[must_use]
    pub fn cut_power(&self) -> bool {
        matches!(
            self.transition,
            Some(PowerTransition {
                to: PowerState::PoweringDown,
                ..
            })
        )
    }
}

/// Owner of the power output line.
pub struct PowerController<O> {
    output: O,
    level: PowerLevel,
    state: PowerState,
}

impl<O: OutputPin> PowerController<O> {
    /// Takes the output line and switches the device on straight away so it
    /// can boot before any decision logic runs.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the output pin cannot be driven.
    pub fn new(mut output: O) -> Result<Self, SignalError> {
        drive(&mut output, SignalLine::PowerOutput, true)?;
        Ok(Self {
            output,
            level: PowerLevel::On,
            state: PowerState::PoweredNormal,
        })
    }

    /// Runs one control iteration.
    ///
    /// * Power present: stop the countdown, clear the elapsed count and the
    ///   diagnostic output, then force the output on.
    /// * Power lost, elapsed count above `threshold`: stop and clear the
    ///   countdown the same way, then switch the output off.
    /// * Otherwise leave the output as it is.
    ///
    /// The countdown is mutated inside a single critical section, which masks
    /// the overflow handler for the whole stop/reset sequence. The output is
    /// driven before a diagnostic write failure is reported, and the state is
    /// updated either way.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the output or diagnostic pin cannot be
    /// driven.
    pub fn poll<C, P>(
        &mut self,
        power_lost: bool,
        threshold: impl Into<u8>,
        countdown: &SharedCountdown<C, P>,
    ) -> Result<PollOutcome, SignalError>
    where
        C: TickCounter,
        P: OutputPin,
    {
        let threshold = threshold.into();
        let previous = self.state;

        let (elapsed, expired, diagnostic) = countdown
            .with(|timer| {
                let elapsed = timer.elapsed();
                let expired = power_lost && elapsed > threshold;
                if !power_lost || expired {
                    timer.stop();
                    timer.reset_elapsed();
                    (elapsed, expired, timer.reset_diagnostic())
                } else {
                    (elapsed, expired, Ok(()))
                }
            })
            .unwrap_or((0, false, Ok(())));

        let next = if power_lost {
            if expired {
                self.set_level(PowerLevel::Off)?;
            }
            match self.level {
                PowerLevel::On => PowerState::PoweredOnBackup,
                PowerLevel::Off => PowerState::PoweringDown,
            }
        } else {
            self.set_level(PowerLevel::On)?;
            PowerState::PoweredNormal
        };

        self.state = next;
        diagnostic?;

        let transition = (previous != next).then_some(PowerTransition {
            from: previous,
            to: next,
        });

        Ok(PollOutcome {
            state: next,
            elapsed,
            threshold,
            transition,
        })
    }

    fn set_level(&mut self, level: PowerLevel) -> Result<(), SignalError> {
        drive(&mut self.output, SignalLine::PowerOutput, level.pin_high())?;
        self.level = level;
        Ok(())
    }

    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.state
    }

    #[must_use]
    pub const fn level(&self) -> PowerLevel {
        self.level
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countdown::{CountdownPhase, CountdownTimer};
    use core::convert::Infallible;
    use embedded_hal::digital::{Error, ErrorKind, ErrorType};

    struct NullCounter;

    impl TickCounter for NullCounter {
        fn restart(&mut self) {}
    }

    #[derive(Default)]
    struct LatchPin {
        high: bool,
    }

    impl ErrorType for LatchPin {
        type Error = Infallible;
    }

    impl OutputPin for LatchPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            Ok(())
        }
    }

    type Countdown = SharedCountdown<NullCounter, LatchPin>;

    #[derive(Debug)]
    struct WriteFault;

    impl Error for WriteFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Accepts `healthy_writes` writes, then fails every one after.
    struct WearingPin {
        writes: u32,
        healthy_writes: u32,
    }

    impl ErrorType for WearingPin {
        type Error = WriteFault;
    }

    impl OutputPin for WearingPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.write()
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.write()
        }
    }

    impl WearingPin {
        fn write(&mut self) -> Result<(), WriteFault> {
            self.writes += 1;
            if self.writes > self.healthy_writes {
                Err(WriteFault)
            } else {
                Ok(())
            }
        }
    }

    fn running_countdown(ticks: u8) -> Countdown {
        let shared = Countdown::with_timer(CountdownTimer::new(NullCounter, LatchPin::default()));
        shared
            .with(|timer| {
                timer.start()?;
                for _ in 0..ticks {
                    timer.on_overflow()?;
                }
                Ok::<_, SignalError>(())
            })
            .unwrap()
            .unwrap();
        shared
    }

    #[test]
    fn output_is_on_at_startup() {
        let controller = PowerController::new(LatchPin::default()).unwrap();
        assert!(controller.output().high);
        assert_eq!(controller.level(), PowerLevel::On);
        assert_eq!(controller.state(), PowerState::PoweredNormal);
    }

    #[test]
    fn cut_happens_only_when_elapsed_exceeds_threshold() {
        for threshold in 0..=16u8 {
            for elapsed in 0..=20u8 {
                let countdown = running_countdown(elapsed);
                let mut controller = PowerController::new(LatchPin::default()).unwrap();
                let outcome = controller.poll(true, threshold, &countdown).unwrap();

                assert_eq!(outcome.elapsed, elapsed);
                assert_eq!(
                    controller.level() == PowerLevel::Off,
                    elapsed > threshold,
                    "threshold={threshold} elapsed={elapsed}"
                );
                assert_eq!(outcome.cut_power(), elapsed > threshold);
            }
        }
    }

    #[test]
    fn never_off_while_power_present() {
        for elapsed in [0u8, 1, 6, 17, 255] {
            let countdown = running_countdown(elapsed);
            let mut controller = PowerController::new(LatchPin::default()).unwrap();
            let outcome = controller.poll(false, 0u8, &countdown).unwrap();

            assert_eq!(outcome.state, PowerState::PoweredNormal);
            assert!(controller.output().high);
            assert_eq!(countdown.elapsed(), 0);
            assert_eq!(countdown.phase(), CountdownPhase::Stopped);
        }
    }

    #[test]
    fn cut_stops_and_clears_countdown() {
        let countdown = running_countdown(6);
        let mut controller = PowerController::new(LatchPin::default()).unwrap();
        let outcome = controller.poll(true, 5u8, &countdown).unwrap();

        assert_eq!(
            outcome.transition,
            Some(PowerTransition {
                from: PowerState::PoweredNormal,
                to: PowerState::PoweringDown,
            })
        );
        assert_eq!(countdown.elapsed(), 0);
        assert_eq!(countdown.phase(), CountdownPhase::Stopped);
        assert!(!countdown.with(|timer| timer.diagnostic_pin().high).unwrap());

        // Stays off on following iterations even though the count is now 0.
        let outcome = controller.poll(true, 5u8, &countdown).unwrap();
        assert_eq!(outcome.state, PowerState::PoweringDown);
        assert_eq!(outcome.transition, None);
        assert!(!controller.output().high);
    }

    #[test]
    fn restoring_power_recovers_from_powering_down() {
        let countdown = running_countdown(3);
        let mut controller = PowerController::new(LatchPin::default()).unwrap();
        controller.poll(true, 1u8, &countdown).unwrap();
        assert_eq!(controller.state(), PowerState::PoweringDown);

        let outcome = controller.poll(false, 1u8, &countdown).unwrap();
        assert_eq!(
            outcome.transition,
            Some(PowerTransition {
                from: PowerState::PoweringDown,
                to: PowerState::PoweredNormal,
            })
        );
        assert!(controller.output().high);
    }

    #[test]
    fn missing_countdown_reads_as_zero() {
        let countdown = Countdown::new();
        let mut controller = PowerController::new(LatchPin::default()).unwrap();
        let outcome = controller.poll(true, 0u8, &countdown).unwrap();
        assert_eq!(outcome.elapsed, 0);
        assert_eq!(outcome.state, PowerState::PoweredOnBackup);
    }

    #[test]
    fn failed_diagnostic_write_still_drives_power() {
        // One write for the start and one per tick, then the pin gives out.
        let countdown = SharedCountdown::with_timer(CountdownTimer::new(
            NullCounter,
            WearingPin {
                writes: 0,
                healthy_writes: 7,
            },
        ));
        countdown
            .with(|timer| {
                timer.start()?;
                for _ in 0..6 {
                    timer.on_overflow()?;
                }
                Ok::<_, SignalError>(())
            })
            .unwrap()
            .unwrap();

        let mut controller = PowerController::new(LatchPin::default()).unwrap();
        let err = controller.poll(true, 5u8, &countdown).unwrap_err();
        assert_eq!(err.line, SignalLine::Diagnostic);
        assert!(!controller.output().high);
        assert_eq!(controller.state(), PowerState::PoweringDown);
        assert_eq!(countdown.elapsed(), 0);
        assert_eq!(countdown.phase(), CountdownPhase::Stopped);

        for _ in 0..3 {
            let err = controller.poll(false, 5u8, &countdown).unwrap_err();
            assert_eq!(err.line, SignalLine::Diagnostic);
            assert!(controller.output().high);
            assert_eq!(controller.state(), PowerState::PoweredNormal);
        }
    }
}
