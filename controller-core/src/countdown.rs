//! Countdown timer driver.
//!
//! A free-running hardware counter overflows once per [`TICK_PERIOD`]; while
//! the countdown is running every overflow advances the elapsed count and
//! flips the diagnostic output. The elapsed count and the enable flag are the
//! only state shared between the foreground loop and interrupt context, so the
//! timer lives behind a [`SharedCountdown`] and is only touched inside a
//! critical section.
//!
//! [`TICK_PERIOD`]: crate::config::TICK_PERIOD

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::digital::OutputPin;

use crate::signals::{DiagnosticLevel, SignalError, SignalLine, drive};

/// Hardware counter behind the countdown.
pub trait TickCounter {
    /// Zeroes the counter so the next overflow is a full period away.
    fn restart(&mut self);
}

impl<T: TickCounter + ?Sized> TickCounter for &mut T {
    fn restart(&mut self) {
        T::restart(self);
    }
}

/// Whether overflows currently advance the elapsed count.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CountdownPhase {
    Stopped,
    Running,
}

impl CountdownPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CountdownPhase::Stopped => "stopped",
            CountdownPhase::Running => "running",
        }
    }
}

/// One accepted overflow.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tick {
    pub elapsed: u8,
    pub diagnostic: DiagnosticLevel,
}

/// Countdown state plus the peripherals it drives.
pub struct CountdownTimer<C, P> {
    counter: C,
    diagnostic_pin: P,
    diagnostic: DiagnosticLevel,
    elapsed: u8,
    enabled: bool,
}

impl<C, P> CountdownTimer<C, P>
where
    C: TickCounter,
    P: OutputPin,
{
    /// Creates a stopped countdown. The diagnostic pin is assumed low.
    pub const fn new(counter: C, diagnostic_pin: P) -> Self {
        Self {
            counter,
            diagnostic_pin,
            diagnostic: DiagnosticLevel::Low,
            elapsed: 0,
            enabled: false,
        }
    }

    /// Restarts the hardware counter, clears the elapsed count, enables
    /// overflow counting and finally drives the diagnostic output low.
    ///
    /// Calling this while already running is a clean restart.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the diagnostic pin cannot be driven; the
    /// countdown is already running from zero by then.
    pub fn start(&mut self) -> Result<(), SignalError> {
        self.counter.restart();
        self.elapsed = 0;
        self.enabled = true;
        self.reset_diagnostic()
    }

    /// Disables overflow counting. The elapsed count and diagnostic level are
    /// left as they are; callers reset them explicitly.
    pub fn stop(&mut self) {
        self.enabled = false;
    }

    pub fn reset_elapsed(&mut self) {
        self.elapsed = 0;
    }

    /// Drives the diagnostic output back to its idle level.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the diagnostic pin cannot be driven.
    pub fn reset_diagnostic(&mut self) -> Result<(), SignalError> {
        self.diagnostic = DiagnosticLevel::Low;
        drive(&mut self.diagnostic_pin, SignalLine::Diagnostic, false)
    }

    /// Handles a counter overflow.
    ///
    /// The overflow flag latches even while counting is disabled, so the
    /// enable flag is checked here and stray overflows return `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the diagnostic pin cannot be driven; the
    /// elapsed count has already advanced by then.
    pub fn on_overflow(&mut self) -> Result<Option<Tick>, SignalError> {
        if !self.enabled {
            return Ok(None);
        }

        self.elapsed = self.elapsed.saturating_add(1);
        self.diagnostic = self.diagnostic.toggled();
        drive(
            &mut self.diagnostic_pin,
            SignalLine::Diagnostic,
            self.diagnostic.is_high(),
        )?;

        Ok(Some(Tick {
            elapsed: self.elapsed,
            diagnostic: self.diagnostic,
        }))
    }

    #[must_use]
    pub const fn phase(&self) -> CountdownPhase {
        if self.enabled {
            CountdownPhase::Running
        } else {
            CountdownPhase::Stopped
        }
    }

    #[must_use]
    pub const fn elapsed(&self) -> u8 {
        self.elapsed
    }

    #[must_use]
    pub const fn diagnostic(&self) -> DiagnosticLevel {
        self.diagnostic
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }

    pub fn diagnostic_pin(&self) -> &P {
        &self.diagnostic_pin
    }
}

/// Interrupt-safe home for a [`CountdownTimer`], usable from a `static`.
pub struct SharedCountdown<C, P> {
    inner: Mutex<RefCell<Option<CountdownTimer<C, P>>>>,
}

impl<C, P> SharedCountdown<C, P>
where
    C: TickCounter,
    P: OutputPin,
{
    /// Creates an empty slot; [`install`](Self::install) fills it at startup.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Creates a slot already holding `timer`.
    pub const fn with_timer(timer: CountdownTimer<C, P>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Some(timer))),
        }
    }

    /// Installs the timer, returning any previously installed one.
    pub fn install(&self, timer: CountdownTimer<C, P>) -> Option<CountdownTimer<C, P>> {
        critical_section::with(|cs| self.inner.borrow(cs).replace(Some(timer)))
    }

    /// Runs `f` on the timer with interrupts masked.
    ///
    /// Returns `None` until a timer has been installed.
    pub fn with<R>(&self, f: impl FnOnce(&mut CountdownTimer<C, P>) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }

    /// Current elapsed count, 0 while no timer is installed.
    pub fn elapsed(&self) -> u8 {
        self.with(|timer| timer.elapsed()).unwrap_or(0)
    }

    /// Current phase, `Stopped` while no timer is installed.
    pub fn phase(&self) -> CountdownPhase {
        self.with(|timer| timer.phase())
            .unwrap_or(CountdownPhase::Stopped)
    }
}

impl<C, P> Default for SharedCountdown<C, P>
where
    C: TickCounter,
    P: OutputPin,
{
    fn default() -> Self {
        Self::new()
    }
}
