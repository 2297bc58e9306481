//! Controller event catalog and a fixed-size history of recent events.
//!
//! The core never logs by itself. Callers turn poll and handler outcomes into
//! [`PowerEvent`]s, push them into a [`TelemetryRecorder`], and forward them
//! to whatever sink the target has (defmt on the MCU, the transcript on the
//! host).

use core::{fmt, time::Duration};

use heapless::HistoryBuf;

use crate::controller::{PollOutcome, PowerState};
use crate::countdown::Tick;
use crate::handlers::EdgeOutcome;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Events worth reporting from the control loop and interrupt handlers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerEvent {
    /// The sampled grace period differs from the previous iteration.
    ThresholdChanged { from: Option<u8>, to: u8 },
    /// A change interrupt fired without starting the countdown.
    ChangeSkipped(EdgeOutcome),
    CountdownStarted,
    Tick { elapsed: u8 },
    PowerCut { elapsed: u8, threshold: u8 },
    PowerRestored { from: PowerState },
    BackupEngaged,
}

impl PowerEvent {
    /// Event for a change-interrupt outcome.
    #[must_use]
    pub const fn from_edge(outcome: EdgeOutcome) -> Self {
        match outcome {
            EdgeOutcome::CountdownStarted => PowerEvent::CountdownStarted,
            other => PowerEvent::ChangeSkipped(other),
        }
    }

    #[must_use]
    pub const fn from_tick(tick: Tick) -> Self {
        PowerEvent::Tick {
            elapsed: tick.elapsed,
        }
    }

    /// Event for a poll that changed state, if any.
    #[must_use]
    pub fn from_poll(outcome: &PollOutcome) -> Option<Self> {
        let transition = outcome.transition?;
        Some(match transition.to {
            PowerState::PoweringDown => PowerEvent::PowerCut {
                elapsed: outcome.elapsed,
                threshold: outcome.threshold,
            },
            PowerState::PoweredNormal => PowerEvent::PowerRestored {
                from: transition.from,
            },
            PowerState::PoweredOnBackup => PowerEvent::BackupEngaged,
        })
    }
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerEvent::ThresholdChanged { from: Some(from), to } => {
                write!(f, "threshold {from} -> {to}")
            }
            PowerEvent::ThresholdChanged { from: None, to } => write!(f, "threshold {to}"),
            PowerEvent::ChangeSkipped(outcome) => write!(f, "change-skipped {}", outcome.as_str()),
            PowerEvent::CountdownStarted => f.write_str("countdown-started"),
            PowerEvent::Tick { elapsed } => write!(f, "tick elapsed={elapsed}"),
            PowerEvent::PowerCut { elapsed, threshold } => {
                write!(f, "power-cut elapsed={elapsed} threshold={threshold}")
            }
            PowerEvent::PowerRestored { from } => write!(f, "power-restored from={}", from.as_str()),
            PowerEvent::BackupEngaged => f.write_str("backup-engaged"),
        }
    }
}

/// Trait implemented by monotonic instants used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Offsets from a fixed origin (boot, session start) act as instants.
impl TelemetryInstant for Duration {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.saturating_sub(earlier)
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: PowerEvent,
    pub since_previous: Option<Duration>,
}

/// Records events into a fixed-size ring buffer, dropping the oldest.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>,
    last_recorded_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_recorded_at: None,
            next_event_id: 0,
        }
    }

    /// Records `event`, capturing the time since the previous record.
    pub fn record(&mut self, event: PowerEvent, timestamp: TInstant) -> EventId {
        let since_previous = self
            .last_recorded_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_recorded_at = Some(timestamp);

        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            since_previous,
        });

        id
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
