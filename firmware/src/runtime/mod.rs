use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::dac::DacCh1;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_time::{Delay, Ticker, Timer};
use holdup_core::config::ControllerConfig;
use holdup_core::controller::PowerController;
use holdup_core::countdown::{CountdownTimer, SharedCountdown};
use holdup_core::handlers::ChangeGate;
use holdup_core::sampler::DelaySampler;
use static_cell::StaticCell;

use crate::board;
use crate::hw::{DacLadder, TickerRestart};

mod control_loop;
mod edge_task;
mod tick_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type Countdown = SharedCountdown<TickerRestart, Output<'static>>;
pub(super) type Sampler = DelaySampler<DacLadder<'static>, Input<'static>, Delay>;

/// Countdown shared by the foreground loop, the edge task and the tick task.
pub(super) static COUNTDOWN: Countdown = SharedCountdown::new();
/// Enable bit for the device-running change handler.
pub(super) static CHANGE_GATE: ChangeGate = ChangeGate::new();
/// Power-loss input, read by both the edge task and the foreground loop.
static POWER_LOSS: StaticCell<Input<'static>> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = ControllerConfig::DEFAULT;
    let hal::Peripherals {
        PA4,
        PA6,
        PB0,
        PB1,
        PB2,
        PB5,
        EXTI5,
        DAC1,
        ..
    } = hal::init(hal::Config::default());

    // Device power comes up before anything else is configured.
    let controller = PowerController::new(Output::new(PB0, Level::High, Speed::Low))
        .expect("power output pin");
    defmt::info!("power: output on, settling for {}ms", board::startup_settle(&config).as_millis());

    let power_loss: &'static Input<'static> = POWER_LOSS.init(Input::new(PB1, Pull::Up));

    let diagnostic = Output::new(PB2, Level::Low, Speed::Low);
    COUNTDOWN.install(CountdownTimer::new(TickerRestart, diagnostic));

    let ladder = DacLadder::new(DacCh1::new_blocking(DAC1, PA4));
    let comparator = Input::new(PA6, Pull::None);
    let sampler = DelaySampler::with_config(ladder, comparator, Delay, &config);

    let device_running = ExtiInput::new(PB5, EXTI5, Pull::Up);

    spawner
        .spawn(tick_task::run(Ticker::every(board::tick_period(&config))))
        .expect("failed to spawn tick task");
    spawner
        .spawn(edge_task::run(device_running, power_loss))
        .expect("failed to spawn edge task");

    Timer::after(board::startup_settle(&config)).await;
    CHANGE_GATE.arm();
    defmt::info!("power: change interrupts armed");

    control_loop::run(controller, sampler, power_loss).await
}
