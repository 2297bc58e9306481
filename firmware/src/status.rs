#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The foreground loop publishes the last sampled threshold and the power
//! state through atomics so the tick task can report them without touching
//! the controller itself.

use holdup_core::controller::{PollOutcome, PowerState};
use holdup_core::telemetry::PowerEvent;
use portable_atomic::{AtomicU8, AtomicU32, Ordering};

/// Sampled levels are 1..=16, so 0 marks "not sampled yet".
const UNKNOWN_THRESHOLD: u8 = 0;
const UNKNOWN_STATE: u8 = 0;

/// Last sampled grace period, in ticks.
static THRESHOLD: AtomicU8 = AtomicU8::new(UNKNOWN_THRESHOLD);
/// Encoded [`PowerState`] from the latest poll.
static POWER_STATE: AtomicU8 = AtomicU8::new(UNKNOWN_STATE);
/// Completed foreground iterations, wrapping.
static ITERATIONS: AtomicU32 = AtomicU32::new(0);

const fn encode_state(state: PowerState) -> u8 {
    match state {
        PowerState::PoweredNormal => 1,
        PowerState::PoweredOnBackup => 2,
        PowerState::PoweringDown => 3,
    }
}

const fn decode_state(raw: u8) -> Option<PowerState> {
    match raw {
        1 => Some(PowerState::PoweredNormal),
        2 => Some(PowerState::PoweredOnBackup),
        3 => Some(PowerState::PoweringDown),
        _ => None,
    }
}

const fn decode_threshold(raw: u8) -> Option<u8> {
    if raw == UNKNOWN_THRESHOLD {
        None
    } else {
        Some(raw)
    }
}

/// Stores the latest threshold and returns the change event when the reading
/// differs from the previous one.
pub fn record_threshold(level: u8) -> Option<PowerEvent> {
    let previous = THRESHOLD.swap(level, Ordering::Relaxed);
    (previous != level).then(|| PowerEvent::ThresholdChanged {
        from: decode_threshold(previous),
        to: level,
    })
}

pub fn threshold() -> Option<u8> {
    decode_threshold(THRESHOLD.load(Ordering::Relaxed))
}

/// Publishes the result of one foreground iteration.
pub fn record_outcome(outcome: &PollOutcome) {
    POWER_STATE.store(encode_state(outcome.state), Ordering::Relaxed);
    ITERATIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn power_state() -> Option<PowerState> {
    decode_state(POWER_STATE.load(Ordering::Relaxed))
}

/// Takes and clears the iteration counter.
pub fn take_iterations() -> u32 {
    ITERATIONS.swap(0, Ordering::Relaxed)
}

/// Label for logs, `"unknown"` before the first poll.
pub fn power_state_label() -> &'static str {
    power_state().map_or("unknown", PowerState::as_str)
}
