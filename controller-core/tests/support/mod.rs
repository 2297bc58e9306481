#![allow(dead_code)]

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use holdup_core::controller::{PollOutcome, PowerController};
use holdup_core::countdown::{CountdownTimer, SharedCountdown, TickCounter};
use holdup_core::handlers::{self, ChangeGate, EdgeOutcome};
use holdup_core::sampler::{DelayLevel, DelaySampler, ReferenceLadder};

#[derive(Default)]
pub struct Counter {
    pub restarts: u32,
}

impl TickCounter for Counter {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

#[derive(Default)]
pub struct Latch {
    pub high: bool,
}

impl ErrorType for Latch {
    type Error = Infallible;
}

impl OutputPin for Latch {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}

pub struct Ladder {
    level: Rc<Cell<u8>>,
}

impl ReferenceLadder for Ladder {
    fn select(&mut self, level: u8) {
        self.level.set(level);
    }
}

/// Reads high once the ladder reaches `crossing`; `None` never crosses.
pub struct Comparator {
    level: Rc<Cell<u8>>,
    crossing: Rc<Cell<Option<u8>>>,
}

impl ErrorType for Comparator {
    type Error = Infallible;
}

impl InputPin for Comparator {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self
            .crossing
            .get()
            .is_some_and(|crossing| self.level.get() >= crossing))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _: u32) {}
}

pub type BenchSampler = DelaySampler<Ladder, Comparator, NoDelay>;

/// Sampler plus a knob selecting the ladder level where it crosses.
pub fn sampler() -> (BenchSampler, Rc<Cell<Option<u8>>>) {
    let level = Rc::new(Cell::new(0));
    let crossing = Rc::new(Cell::new(None));
    let sampler = DelaySampler::new(
        Ladder {
            level: Rc::clone(&level),
        },
        Comparator {
            level,
            crossing: Rc::clone(&crossing),
        },
        NoDelay,
    );
    (sampler, crossing)
}

/// Controller wired to simulated inputs, with change interrupts armed.
pub struct Bench {
    pub countdown: SharedCountdown<Counter, Latch>,
    pub gate: ChangeGate,
    pub controller: PowerController<Latch>,
    pub sampler: BenchSampler,
    pub crossing: Rc<Cell<Option<u8>>>,
    pub power_lost: bool,
    pub device_running: bool,
}

impl Bench {
    pub fn new() -> Self {
        let countdown = SharedCountdown::new();
        countdown.install(CountdownTimer::new(Counter::default(), Latch::default()));
        let gate = ChangeGate::new();
        gate.arm();
        let (sampler, crossing) = sampler();

        Self {
            countdown,
            gate,
            controller: PowerController::new(Latch::default()).unwrap(),
            sampler,
            crossing,
            power_lost: false,
            device_running: true,
        }
    }

    /// Makes the sampler read `threshold` (1..=16).
    pub fn set_threshold(&mut self, threshold: u8) {
        let crossing = threshold.checked_sub(1).filter(|level| *level < 15);
        self.crossing.set(crossing);
    }

    pub fn sample(&mut self) -> DelayLevel {
        self.sampler.sample().unwrap()
    }

    /// One foreground iteration with a freshly sampled threshold.
    pub fn poll(&mut self) -> PollOutcome {
        let threshold = self.sample();
        self.controller
            .poll(self.power_lost, threshold, &self.countdown)
            .unwrap()
    }

    pub fn set_power_lost(&mut self, lost: bool) {
        self.power_lost = lost;
    }

    /// Changes the device-running input, firing the change interrupt when the
    /// level actually moves.
    pub fn set_device_running(&mut self, running: bool) -> Option<EdgeOutcome> {
        if self.device_running == running {
            return None;
        }
        self.device_running = running;
        Some(
            handlers::on_signal_change(&self.gate, self.power_lost, running, &self.countdown)
                .unwrap(),
        )
    }

    /// One counter overflow followed by a foreground iteration.
    pub fn tick(&mut self) -> PollOutcome {
        handlers::on_timer_overflow(&self.countdown).unwrap();
        self.poll()
    }

    pub fn output_on(&self) -> bool {
        self.controller.output().high
    }

    pub fn elapsed(&self) -> u8 {
        self.countdown.elapsed()
    }
}
