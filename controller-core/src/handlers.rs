//! Interrupt entry points.
//!
//! Two independent event sources feed the controller: a change on the
//! device-running input and an overflow of the countdown counter. Targets
//! with a vector per source call [`on_signal_change`] and
//! [`on_timer_overflow`] directly; targets with a single shared vector hand
//! the latched flags to [`dispatch`].
//!
//! Both hardware flags latch whether or not their interrupt is enabled, so
//! each handler confirms the flag first and only then consults the matching
//! enable bit.

use embedded_hal::digital::OutputPin;
use portable_atomic::{AtomicBool, Ordering};

use crate::countdown::{SharedCountdown, Tick, TickCounter};
use crate::signals::SignalError;

/// Enable bit for the change interrupt.
///
/// Starts disarmed; the runtime arms it once the inputs have settled after
/// power-up.
#[derive(Debug, Default)]
pub struct ChangeGate {
    armed: AtomicBool,
}

impl ChangeGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

/// What a change interrupt did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeOutcome {
    /// Change interrupts are not armed yet (or no countdown is installed).
    Ignored,
    /// Utility power is present; nothing to count down.
    PowerPresent,
    /// Power is lost but the device is still running.
    DeviceRunning,
    /// The device stopped during an outage; the countdown (re)started.
    CountdownStarted,
}

impl EdgeOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EdgeOutcome::Ignored => "ignored",
            EdgeOutcome::PowerPresent => "power-present",
            EdgeOutcome::DeviceRunning => "device-running",
            EdgeOutcome::CountdownStarted => "countdown-started",
        }
    }
}

/// Handles a change on the device-running input.
///
/// `power_lost` and `device_running` are the decoded levels read inside the
/// handler. The countdown starts only when utility power is absent and the
/// device reports it has stopped; a countdown already running is restarted.
///
/// # Errors
///
/// Returns [`SignalError`] when the diagnostic pin cannot be reset.
pub fn on_signal_change<C, P>(
    gate: &ChangeGate,
    power_lost: bool,
    device_running: bool,
    countdown: &SharedCountdown<C, P>,
) -> Result<EdgeOutcome, SignalError>
where
    C: TickCounter,
    P: OutputPin,
{
    if !gate.is_armed() {
        return Ok(EdgeOutcome::Ignored);
    }
    if !power_lost {
        return Ok(EdgeOutcome::PowerPresent);
    }
    if device_running {
        return Ok(EdgeOutcome::DeviceRunning);
    }

    let started = countdown.with(|timer| timer.start()).transpose()?;
    Ok(started.map_or(EdgeOutcome::Ignored, |()| EdgeOutcome::CountdownStarted))
}

/// Handles an overflow of the countdown counter.
///
/// Returns `None` when counting is disabled or no countdown is installed.
///
/// # Errors
///
/// Returns [`SignalError`] when the diagnostic pin cannot be toggled.
pub fn on_timer_overflow<C, P>(
    countdown: &SharedCountdown<C, P>,
) -> Result<Option<Tick>, SignalError>
where
    C: TickCounter,
    P: OutputPin,
{
    Ok(countdown.with(|timer| timer.on_overflow()).transpose()?.flatten())
}

/// Interrupt flags latched by the hardware at the time of a shared-vector
/// interrupt.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PendingInterrupts {
    pub signal_change: bool,
    pub timer_overflow: bool,
}

/// What [`dispatch`] did for each latched flag.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DispatchOutcome {
    pub edge: Option<EdgeOutcome>,
    pub tick: Option<Tick>,
}

/// Single-vector dispatcher: services the change flag, then the overflow
/// flag. Flags that are not latched are skipped without looking at their
/// enable bits.
///
/// # Errors
///
/// Returns [`SignalError`] when the diagnostic pin cannot be driven.
pub fn dispatch<C, P>(
    pending: PendingInterrupts,
    gate: &ChangeGate,
    power_lost: bool,
    device_running: bool,
    countdown: &SharedCountdown<C, P>,
) -> Result<DispatchOutcome, SignalError>
where
    C: TickCounter,
    P: OutputPin,
{
    let mut outcome = DispatchOutcome::default();

    if pending.signal_change {
        outcome.edge = Some(on_signal_change(
            gate,
            power_lost,
            device_running,
            countdown,
        )?);
    }

    if pending.timer_overflow {
        outcome.tick = on_timer_overflow(countdown)?;
    }

    Ok(outcome)
}
