//! Foreground control loop.
//!
//! Each iteration samples the grace-period setting, reads the power-loss
//! input and lets the controller decide the output level. The loop yields
//! between iterations so the edge and tick tasks get serviced promptly.

use embassy_futures::yield_now;
use embassy_stm32::gpio::{Input, Output};
use holdup_core::controller::{PollOutcome, PowerController};
use holdup_core::signals::{SignalError, power_lost_from_pin};
use holdup_core::telemetry::PowerEvent;

use super::{COUNTDOWN, Sampler};
use crate::{status, telemetry};

pub async fn run(
    mut controller: PowerController<Output<'static>>,
    mut sampler: Sampler,
    power_loss: &'static Input<'static>,
) -> ! {
    loop {
        if let Err(err) = iterate(&mut controller, &mut sampler, power_loss) {
            defmt::error!("control: {}", defmt::Display2Format(&err));
        }
        yield_now().await;
    }
}

fn iterate(
    controller: &mut PowerController<Output<'static>>,
    sampler: &mut Sampler,
    power_loss: &Input<'static>,
) -> Result<PollOutcome, SignalError> {
    let trace = sampler.sample_traced()?;
    let threshold = trace.level;
    if let Some(event) = status::record_threshold(threshold.get()) {
        defmt::debug!(
            "sampler: ladder={} crossed={}",
            trace.last_reference,
            trace.crossed
        );
        telemetry::record(event);
    }

    let power_lost = power_lost_from_pin(power_loss.is_high());
    let outcome = controller.poll(power_lost, threshold, &COUNTDOWN)?;
    status::record_outcome(&outcome);

    if let Some(event) = PowerEvent::from_poll(&outcome) {
        telemetry::record(event);
    }
    Ok(outcome)
}
