//! Embassy-backed implementations of the `holdup-core` hardware seams.

#![cfg(target_os = "none")]

mod ladder;

pub use ladder::DacLadder;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use holdup_core::countdown::TickCounter;

/// Raised whenever the countdown restarts; the tick task realigns its ticker
/// so the next overflow is a full period away.
pub static TICK_RESTART: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Countdown counter backed by the tick task's [`embassy_time::Ticker`].
pub struct TickerRestart;

impl TickCounter for TickerRestart {
    fn restart(&mut self) {
        TICK_RESTART.signal(());
    }
}
