//! Telemetry ring buffer and logging helpers.
//!
//! Every controller event goes through [`record`]: it lands in a shared
//! [`TelemetryRecorder`] and is mirrored to defmt (or stdout on the host) so
//! the power decisions can be followed over RTT during bring-up.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;
use holdup_core::telemetry::{
    EventId, PowerEvent, TELEMETRY_RING_CAPACITY, TelemetryInstant,
    TelemetryRecorder as CoreRecorder,
};

/// Monotonic instant used for firmware telemetry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    #[must_use]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        let delta = self.0.saturating_duration_since(earlier.0);
        core::time::Duration::from_micros(delta.as_micros())
    }
}

pub type TelemetryRecorder = CoreRecorder<FirmwareInstant, TELEMETRY_RING_CAPACITY>;

static RECORDER: Mutex<CriticalSectionRawMutex, RefCell<TelemetryRecorder>> =
    Mutex::new(RefCell::new(TelemetryRecorder::new()));

/// Records `event` at the current time and logs it.
#[cfg(target_os = "none")]
pub fn record(event: PowerEvent) -> EventId {
    record_at(event, FirmwareInstant::now())
}

/// Records `event` with an explicit timestamp and logs it.
pub fn record_at(event: PowerEvent, timestamp: FirmwareInstant) -> EventId {
    let (id, since_previous) = RECORDER.lock(|cell| {
        let mut recorder = cell.borrow_mut();
        let id = recorder.record(event, timestamp);
        let since_previous = recorder.latest().and_then(|record| record.since_previous);
        (id, since_previous)
    });

    let timestamp_us = timestamp.into_embassy().as_micros();
    let delta_us = since_previous.map(delta_micros);
    emit_log(id, &event, timestamp_us, delta_us);
    id
}

fn delta_micros(delta: core::time::Duration) -> u64 {
    u64::try_from(delta.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(target_os = "none")]
fn emit_log(id: EventId, event: &PowerEvent, timestamp_us: u64, delta_us: Option<u64>) {
    let event = defmt::Display2Format(event);
    match delta_us {
        Some(delta) => defmt::info!(
            "telemetry:power #{} {} t={}us Δ={}us",
            id,
            event,
            timestamp_us,
            delta
        ),
        None => defmt::info!("telemetry:power #{} {} t={}us", id, event, timestamp_us),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(id: EventId, event: &PowerEvent, timestamp_us: u64, delta_us: Option<u64>) {
    if let Some(delta) = delta_us {
        println!("telemetry:power #{id} {event} t={timestamp_us}us Δ={delta}us");
    } else {
        println!("telemetry:power #{id} {event} t={timestamp_us}us");
    }
}
