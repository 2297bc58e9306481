#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Wake-up ordering for the countdown tick source.

use core::future::Future;

use embassy_futures::select::{Either, select};

/// Reason the tick task woke up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TickWake {
    /// The countdown was restarted; the ticker must be realigned.
    Restart,
    /// A tick period elapsed.
    Overflow,
}

/// Waits for the next restart or tick.
///
/// The restart is polled first, so a tick that fell due in the same instant
/// is only counted after the ticker has been realigned.
pub async fn next_wake(
    restart: impl Future<Output = ()>,
    tick: impl Future<Output = ()>,
) -> TickWake {
    match select(restart, tick).await {
        Either::First(()) => TickWake::Restart,
        Either::Second(()) => TickWake::Overflow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::future::{pending, ready};
    use embassy_futures::block_on;

    #[test]
    fn pending_restart_wins_over_due_tick() {
        assert_eq!(block_on(next_wake(ready(()), ready(()))), TickWake::Restart);
    }

    #[test]
    fn due_tick_counts_without_restart() {
        assert_eq!(
            block_on(next_wake(pending::<()>(), ready(()))),
            TickWake::Overflow
        );
        assert_eq!(
            block_on(next_wake(ready(()), pending::<()>())),
            TickWake::Restart
        );
    }
}
