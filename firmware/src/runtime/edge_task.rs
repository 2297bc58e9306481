//! Device-running change handler.

use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Input;
use holdup_core::handlers;
use holdup_core::signals::{device_running_from_pin, power_lost_from_pin};
use holdup_core::telemetry::PowerEvent;

use super::{CHANGE_GATE, COUNTDOWN};
use crate::telemetry;

#[embassy_executor::task]
pub async fn run(mut device_running: ExtiInput<'static>, power_loss: &'static Input<'static>) -> ! {
    loop {
        device_running.wait_for_any_edge().await;

        let power_lost = power_lost_from_pin(power_loss.is_high());
        let running = device_running_from_pin(device_running.is_high());

        match handlers::on_signal_change(&CHANGE_GATE, power_lost, running, &COUNTDOWN) {
            Ok(outcome) => {
                telemetry::record(PowerEvent::from_edge(outcome));
            }
            Err(err) => defmt::error!("edge: {}", defmt::Display2Format(&err)),
        }
    }
}
