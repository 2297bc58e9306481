#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board wiring for the STM32G0 port of the hold-up controller.
//!
//! The pin catalog is plain data so it can be checked on the host; the
//! runtime claims the matching peripherals by name.

use embassy_time::Duration;
use holdup_core::config::{ControllerConfig, LADDER_STEPS};
use holdup_core::sampler::LadderRange;

/// Supply rail feeding the comparator and the reference DAC.
pub const VDD_MV: u32 = 3_300;

/// Range the DAC reproduces when emulating the reference ladder.
pub const LADDER_RANGE: LadderRange = LadderRange::High;

/// Full-scale code of the 12-bit DAC.
pub const DAC_FULL_SCALE: u32 = 4_095;

/// Logical role of a board pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BoardSignal {
    PowerOutput,
    PowerLoss,
    Diagnostic,
    DeviceRunning,
    Reference,
    Comparator,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinDirection {
    Input,
    Output,
    Analog,
}

/// Static description of a single board pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinAssignment {
    pub signal: BoardSignal,
    pub mcu_pin: &'static str,
    pub direction: PinDirection,
    pub pull_up: bool,
    pub description: &'static str,
}

pub const PIN_MAP: [PinAssignment; 6] = [
    PinAssignment {
        signal: BoardSignal::PowerOutput,
        mcu_pin: "PB0",
        direction: PinDirection::Output,
        pull_up: false,
        description: "Device supply switch (high = on)",
    },
    PinAssignment {
        signal: BoardSignal::PowerLoss,
        mcu_pin: "PB1",
        direction: PinDirection::Input,
        pull_up: true,
        description: "Utility power monitor (high = lost)",
    },
    PinAssignment {
        signal: BoardSignal::Diagnostic,
        mcu_pin: "PB2",
        direction: PinDirection::Output,
        pull_up: false,
        description: "Countdown heartbeat, toggles every tick",
    },
    PinAssignment {
        signal: BoardSignal::DeviceRunning,
        mcu_pin: "PB5",
        direction: PinDirection::Input,
        pull_up: true,
        description: "Device status, active low, EXTI5",
    },
    PinAssignment {
        signal: BoardSignal::Reference,
        mcu_pin: "PA4",
        direction: PinDirection::Analog,
        pull_up: false,
        description: "DAC1_OUT1 reference ladder",
    },
    PinAssignment {
        signal: BoardSignal::Comparator,
        mcu_pin: "PA6",
        direction: PinDirection::Input,
        pull_up: false,
        description: "External comparator output (high = reference above pot)",
    },
];

/// Looks up the pin carrying `signal`.
pub fn pin_for(signal: BoardSignal) -> Option<&'static PinAssignment> {
    PIN_MAP.iter().find(|pin| pin.signal == signal)
}

/// DAC code that reproduces ladder `level` on the reference pin.
#[must_use]
pub fn dac_code(level: u8) -> u16 {
    let millivolts = LADDER_RANGE.reference_millivolts(level, VDD_MV);
    let code = millivolts * DAC_FULL_SCALE / VDD_MV;
    u16::try_from(code.min(DAC_FULL_SCALE)).unwrap_or(u16::MAX)
}

/// Converts a core duration into an embassy one, saturating at `u64::MAX` µs.
#[must_use]
pub fn embassy_duration(duration: core::time::Duration) -> Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(micros)
}

#[must_use]
pub fn tick_period(config: &ControllerConfig) -> Duration {
    embassy_duration(config.tick_period)
}

#[must_use]
pub fn startup_settle(config: &ControllerConfig) -> Duration {
    embassy_duration(config.startup_settle)
}

/// Highest ladder level the sampler ever selects.
pub const TOP_LADDER_LEVEL: u8 = LADDER_STEPS - 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_signal_has_one_pin() {
        let signals = [
            BoardSignal::PowerOutput,
            BoardSignal::PowerLoss,
            BoardSignal::Diagnostic,
            BoardSignal::DeviceRunning,
            BoardSignal::Reference,
            BoardSignal::Comparator,
        ];
        for signal in signals {
            let count = PIN_MAP.iter().filter(|pin| pin.signal == signal).count();
            assert_eq!(count, 1, "{signal:?}");
        }

        for (index, pin) in PIN_MAP.iter().enumerate() {
            assert!(
                PIN_MAP[index + 1..].iter().all(|other| other.mcu_pin != pin.mcu_pin),
                "{} assigned twice",
                pin.mcu_pin
            );
        }
    }

    #[test]
    fn inputs_that_idle_high_are_pulled_up() {
        assert!(pin_for(BoardSignal::PowerLoss).unwrap().pull_up);
        assert!(pin_for(BoardSignal::DeviceRunning).unwrap().pull_up);
        assert_eq!(
            pin_for(BoardSignal::Reference).unwrap().direction,
            PinDirection::Analog
        );
    }

    #[test]
    fn dac_codes_rise_with_ladder_level() {
        // High range: a quarter of the rail at level 0.
        assert_eq!(dac_code(0), 1_023);
        let mut previous = 0;
        for level in 0..=TOP_LADDER_LEVEL {
            let code = dac_code(level);
            assert!(code > previous || level == 0);
            assert!(u32::from(code) <= DAC_FULL_SCALE);
            previous = code;
        }
        assert_eq!(dac_code(40), dac_code(TOP_LADDER_LEVEL));
    }

    #[test]
    fn timing_converts_to_embassy_units() {
        let config = ControllerConfig::DEFAULT;
        assert_eq!(tick_period(&config).as_micros(), 1_365_333);
        assert_eq!(startup_settle(&config).as_millis(), 100);
    }
}
