//! Countdown overflow source.
//!
//! A free-running [`Ticker`] stands in for the overflowing counter. Restarting
//! the countdown resets the ticker so the first tick is a full period out,
//! even when the ticker deadline has already passed by the time the restart
//! is seen.

use embassy_time::Ticker;
use holdup_core::handlers;
use holdup_core::telemetry::PowerEvent;

use super::COUNTDOWN;
use crate::hw::TICK_RESTART;
use crate::ticks::{self, TickWake};
use crate::{status, telemetry};

#[embassy_executor::task]
pub async fn run(mut ticker: Ticker) -> ! {
    loop {
        match ticks::next_wake(TICK_RESTART.wait(), ticker.next()).await {
            TickWake::Overflow => match handlers::on_timer_overflow(&COUNTDOWN) {
                Ok(Some(tick)) => {
                    telemetry::record(PowerEvent::from_tick(tick));
                    defmt::debug!(
                        "status: threshold={} state={} iterations={}",
                        status::threshold(),
                        status::power_state_label(),
                        status::take_iterations()
                    );
                }
                Ok(None) => {}
                Err(err) => defmt::error!("tick: {}", defmt::Display2Format(&err)),
            },
            TickWake::Restart => ticker.reset(),
        }
    }
}
