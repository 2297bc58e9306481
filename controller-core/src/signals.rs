//! Logical view of the controller's electrical lines.
//!
//! Pin polarity is decoded here once so the rest of the crate only ever deals
//! with logical values ("power lost", "device running", "power on").

use core::fmt;

use embedded_hal::digital::ErrorKind;

/// State of the line switching power to the attached device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerLevel {
    On,
    Off,
}

impl PowerLevel {
    /// Decodes the output latch (logic 1 drives the switch on).
    #[must_use]
    pub const fn from_pin_high(high: bool) -> Self {
        if high { PowerLevel::On } else { PowerLevel::Off }
    }

    /// Level the output pin must be driven to.
    #[must_use]
    pub const fn pin_high(self) -> bool {
        matches!(self, PowerLevel::On)
    }

    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, PowerLevel::On)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PowerLevel::On => "on",
            PowerLevel::Off => "off",
        }
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes the power-loss input: a high pin means utility power is absent.
#[must_use]
pub const fn power_lost_from_pin(high: bool) -> bool {
    high
}

/// Decodes the device-running input, which is inverted at the pin: low means
/// the attached device is still executing.
#[must_use]
pub const fn device_running_from_pin(high: bool) -> bool {
    !high
}

/// Level of the free-running diagnostic toggle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DiagnosticLevel {
    #[default]
    Low,
    High,
}

impl DiagnosticLevel {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            DiagnosticLevel::Low => DiagnosticLevel::High,
            DiagnosticLevel::High => DiagnosticLevel::Low,
        }
    }

    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, DiagnosticLevel::High)
    }
}

/// Lines the core drives or reads through `embedded-hal`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignalLine {
    PowerOutput,
    Diagnostic,
    Comparator,
}

impl SignalLine {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SignalLine::PowerOutput => "power-output",
            SignalLine::Diagnostic => "diagnostic",
            SignalLine::Comparator => "comparator",
        }
    }
}

/// Pin access failure reported by a HAL.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignalError {
    pub line: SignalLine,
    pub kind: ErrorKind,
}

impl SignalError {
    #[must_use]
    pub const fn new(line: SignalLine, kind: ErrorKind) -> Self {
        Self { line, kind }
    }

    /// Builds a mapper for `Result::map_err` that tags a HAL error with its line.
    pub fn on<E: embedded_hal::digital::Error>(line: SignalLine) -> impl Fn(E) -> Self {
        move |err| Self::new(line, err.kind())
    }
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pin error: {:?}", self.line.as_str(), self.kind)
    }
}

/// Drives an output pin high or low, tagging failures with `line`.
///
/// # Errors
///
/// Returns [`SignalError`] when the HAL rejects the write.
pub fn drive<P: embedded_hal::digital::OutputPin>(
    pin: &mut P,
    line: SignalLine,
    high: bool,
) -> Result<(), SignalError> {
    if high {
        pin.set_high().map_err(SignalError::on(line))
    } else {
        pin.set_low().map_err(SignalError::on(line))
    }
}
