//! Real hardware backend: one PIO state machine, reconfigured pin by
//! pin as [`crate::controller::Controller`] round-robins across
//! channels. Grounded in the teacher crate's `rp2040-dshot/src/driver.rs`
//! PIO wiring, collapsed from "one state machine per channel" to "one
//! state machine, reconfigured per channel" to match spec §4.3.

mod program;

use program::{generate_dshot_program, DshotPioTimings, DSHOT_PROGRAM_SIZE};

use super::{DshotHal, HalError, SmConfig};
use crate::channel::MAX_CHANNELS_PER_CONTROLLER;

use embassy_rp::pio::{Common, Config as PioConfig, Instance, Pin, ShiftDirection, StateMachine};
use embassy_time::Instant;
use fixed::types::extra::U8;
use fixed::FixedU32;
use portable_atomic::{AtomicBool, Ordering};

/// Two PIO blocks on RP2040; indexes the per-block upload-once flags
/// the spec requires (§3, §5).
const NUM_PIO_BLOCKS: usize = 2;

static PROGRAM_LOADED: [AtomicBool; NUM_PIO_BLOCKS] =
    [AtomicBool::new(false), AtomicBool::new(false)];

/// RP2040 PIO backend for one controller's state machine.
///
/// `pins` holds one pre-configured [`Pin`] per channel the controller
/// will round-robin across (consecutive GPIOs starting at `base_pin`
/// per spec §3); wiring those pins up (pin muxing, pull configuration)
/// is peripheral-init glue out of this crate's scope (spec §1) and is
/// expected to have already happened by the time this HAL is
/// constructed. [`SmConfig::pin`] always carries the absolute GPIO
/// number the controller computed (spec §4.3: `base_pin +
/// active_channel`), so this HAL subtracts `base_pin` back out to
/// index into `pins`.
pub struct Rp2040Hal<'d, PIO: Instance, const SM: usize> {
    common: Common<'d, PIO>,
    sm: StateMachine<'d, PIO, SM>,
    pins: [Pin<'d, PIO>; MAX_CHANNELS_PER_CONTROLLER],
    pio_block_index: usize,
    base_pin: u8,
}

impl<'d, PIO: Instance, const SM: usize> Rp2040Hal<'d, PIO, SM> {
    pub fn new(
        common: Common<'d, PIO>,
        sm: StateMachine<'d, PIO, SM>,
        pins: [Pin<'d, PIO>; MAX_CHANNELS_PER_CONTROLLER],
        pio_block_index: usize,
        base_pin: u8,
    ) -> Self {
        Self { common, sm, pins, pio_block_index, base_pin }
    }
}

impl<'d, PIO: Instance, const SM: usize> DshotHal for Rp2040Hal<'d, PIO, SM> {
    // The program is loaded into its block exactly once and never shares
    // the block with any other resident program (mirroring the teacher's
    // own `common.load_program(&program)` call in `motor-controller/src/dshot.rs`,
    // which likewise never threads the returned offset back through),
    // so there is nothing for callers to hold onto.
    type ProgramHandle = ();

    fn program_upload_once(&mut self) -> Result<Self::ProgramHandle, HalError> {
        let block = self.pio_block_index;

        if PROGRAM_LOADED[block].load(Ordering::Acquire) {
            return Ok(());
        }

        let timings = DshotPioTimings::new();
        let program = generate_dshot_program(&timings);

        if !self.common.can_add_program(&program) {
            return Err(HalError::ProgramDoesNotFit);
        }
        self.common.load_program(&program);
        PROGRAM_LOADED[block].store(true, Ordering::Release);

        #[cfg(feature = "defmt")]
        defmt::info!("DShot PIO program loaded on block {}", block);

        Ok(())
    }

    fn sm_configure(&mut self, _program: Self::ProgramHandle, config: SmConfig) {
        let channel_idx = (config.pin - self.base_pin) as usize;
        let pin = &self.pins[channel_idx];

        let mut pio_config = PioConfig::default();
        pio_config.set_out_pins(&[pin]);
        pio_config.set_set_pins(&[pin]);
        pio_config.set_in_pins(&[pin]);
        pio_config.set_jmp_pin(pin);
        pio_config.shift_out.direction = ShiftDirection::Left;
        pio_config.shift_in.direction = ShiftDirection::Left;
        pio_config.clock_divider = FixedU32::<U8>::from_bits(config.clkdiv_bits);

        self.sm.set_config(&pio_config);
    }

    fn sm_start(&mut self) {
        self.sm.set_enable(true);
    }

    fn sm_stop(&mut self) {
        self.sm.set_enable(false);
    }

    fn sm_tx_empty(&self) -> bool {
        self.sm.tx().empty()
    }

    fn sm_tx_push(&mut self, word: u32) {
        self.sm.tx().push(word);
    }

    fn sm_rx_pop_blocking(&mut self) -> u32 {
        loop {
            if let Some(word) = self.sm.rx().try_pull() {
                return word;
            }
        }
    }

    fn system_clock_hz(&self) -> u32 {
        embassy_rp::clocks::clk_sys_freq()
    }

    type Instant = Instant;

    fn monotonic_now(&self) -> Self::Instant {
        Instant::now()
    }

    fn elapsed_us(&self, earlier: Self::Instant, later: Self::Instant) -> i64 {
        later.as_micros() as i64 - earlier.as_micros() as i64
    }
}
