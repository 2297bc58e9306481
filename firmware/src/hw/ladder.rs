//! Reference ladder emulated with the on-chip DAC.
//!
//! The STM32G0 has no comparator reference ladder of its own, so DAC1 channel
//! 1 drives the comparator's reference input with the voltage the ladder
//! would produce at each level.

use embassy_stm32::dac::{DacCh1, Value};
use embassy_stm32::mode::Blocking;
use embassy_stm32::peripherals::DAC1;
use holdup_core::sampler::ReferenceLadder;

use crate::board;

pub struct DacLadder<'d> {
    dac: DacCh1<'d, DAC1, Blocking>,
}

impl<'d> DacLadder<'d> {
    /// Wraps the channel and parks it on the lowest level.
    pub fn new(dac: DacCh1<'d, DAC1, Blocking>) -> Self {
        let mut ladder = Self { dac };
        ladder.select(0);
        ladder
    }
}

impl ReferenceLadder for DacLadder<'_> {
    fn select(&mut self, level: u8) {
        self.dac.set(Value::Bit12Right(board::dac_code(level)));
    }
}
