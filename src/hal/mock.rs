//! An in-memory stand-in for the PIO hardware, used by this crate's own
//! tests and available to downstream integration tests. There is no
//! software PIO simulator in the embassy-rp ecosystem to ground this
//! on; it follows the same narrow-seam-trait shape the teacher crate
//! uses for [`crate::hal::DshotHal`] itself.

use super::{DshotHal, HalError, SmConfig};

const RX_QUEUE_CAP: usize = 16;

/// A fake [`DshotHal`] driven entirely by the test. Transmitted frame
/// words land in [`MockHal::last_tx_frame`]; queue captured reverse
/// frames ahead of time with [`MockHal::push_rx_word`].
pub struct MockHal {
    program_loaded: bool,
    running: bool,
    active_pin: Option<u8>,
    last_tx_frame: Option<u32>,
    last_tx_wait_cycles: Option<u32>,
    tx_push_count: u32,
    rx_queue: [u32; RX_QUEUE_CAP],
    rx_head: usize,
    rx_len: usize,
    now_us: u64,
    clock_hz: u32,
    fail_program_upload: bool,
}

impl MockHal {
    pub const fn new(clock_hz: u32) -> Self {
        Self {
            program_loaded: false,
            running: false,
            active_pin: None,
            last_tx_frame: None,
            last_tx_wait_cycles: None,
            tx_push_count: 0,
            rx_queue: [0; RX_QUEUE_CAP],
            rx_head: 0,
            rx_len: 0,
            now_us: 0,
            clock_hz,
            fail_program_upload: false,
        }
    }

    /// Makes the next [`DshotHal::program_upload_once`] call fail, as if
    /// the program did not fit in the hardware block.
    pub fn fail_next_program_upload(&mut self) {
        self.fail_program_upload = true;
    }

    /// Queues a raw 32-bit word to be returned by the next
    /// [`DshotHal::sm_rx_pop_blocking`] call. If the queue is empty when
    /// popped, `0` is returned (an empty/timeout reply).
    pub fn push_rx_word(&mut self, word: u32) {
        assert!(self.rx_len < RX_QUEUE_CAP, "mock rx queue overflow");
        let slot = (self.rx_head + self.rx_len) % RX_QUEUE_CAP;
        self.rx_queue[slot] = word;
        self.rx_len += 1;
    }

    /// Advances the mock's monotonic clock.
    pub fn advance_us(&mut self, us: u64) {
        self.now_us += us;
    }

    pub const fn last_tx_frame(&self) -> Option<u32> {
        self.last_tx_frame
    }

    pub const fn active_pin(&self) -> Option<u8> {
        self.active_pin
    }

    pub const fn tx_push_count(&self) -> u32 {
        self.tx_push_count
    }

    pub const fn last_tx_wait_cycles(&self) -> Option<u32> {
        self.last_tx_wait_cycles
    }

    pub const fn is_running(&self) -> bool {
        self.running
    }
}

impl DshotHal for MockHal {
    type ProgramHandle = ();

    fn program_upload_once(&mut self) -> Result<Self::ProgramHandle, HalError> {
        if self.fail_program_upload {
            self.fail_program_upload = false;
            return Err(HalError::ProgramDoesNotFit);
        }
        self.program_loaded = true;
        Ok(())
    }

    fn sm_configure(&mut self, _program: Self::ProgramHandle, config: SmConfig) {
        self.active_pin = Some(config.pin);
    }

    fn sm_start(&mut self) {
        self.running = true;
    }

    fn sm_stop(&mut self) {
        self.running = false;
    }

    fn sm_tx_empty(&self) -> bool {
        // The mock "drains" instantly: there is always room for the
        // next frame, mirroring real hardware once the prior frame
        // period has elapsed (which `complete()` always waits out).
        true
    }

    fn sm_tx_push(&mut self, word: u32) {
        if self.tx_push_count % 2 == 0 {
            self.last_tx_frame = Some(word);
        } else {
            self.last_tx_wait_cycles = Some(word);
        }
        self.tx_push_count += 1;
    }

    fn sm_rx_pop_blocking(&mut self) -> u32 {
        if self.rx_len == 0 {
            return 0;
        }
        let word = self.rx_queue[self.rx_head];
        self.rx_head = (self.rx_head + 1) % RX_QUEUE_CAP;
        self.rx_len -= 1;
        word
    }

    fn system_clock_hz(&self) -> u32 {
        self.clock_hz
    }

    type Instant = u64;

    fn monotonic_now(&self) -> Self::Instant {
        self.now_us
    }

    fn elapsed_us(&self, earlier: Self::Instant, later: Self::Instant) -> i64 {
        later as i64 - earlier as i64
    }
}
