//! The hardware abstraction seam (spec §4.6): the narrow set of
//! capabilities the controller engine needs from the programmable-IO
//! hardware. [`Controller`](crate::controller::Controller) is generic
//! over this trait so the engine's round-robin, latching, and watchdog
//! logic can be exercised without real silicon.

pub mod mock;
#[cfg(feature = "rp2040")]
pub mod rp2040;

/// Configuration handed to [`DshotHal::sm_configure`]: which pin the
/// state machine should drive/sample and the clock divisor to run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmConfig {
    /// Absolute GPIO number (`base_pin + active_channel`, spec §4.3), not
    /// a channel index. Backends that need a channel-relative index
    /// recover it by subtracting their own `base_pin` back out.
    pub pin: u8,
    /// Clock divisor as a 16.8 fixed-point value in `fixed::FixedU32<U8>`'s
    /// bit layout (16 integer bits, 8 fractional bits), computed by the
    /// controller from `system_clock_hz / (wire_speed * 40)` (spec §6).
    /// Carried as raw bits here so this trait stays independent of the
    /// `fixed` crate, which only the rp2040 backend needs.
    pub clkdiv_bits: u32,
}

/// Errors a HAL implementation can report from configuration-time
/// operations. Transient wire errors never reach this type — those are
/// folded into per-channel [`crate::channel::RxStats`] (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum HalError {
    /// The programmable-IO program does not fit in the target block.
    #[error("DShot PIO program does not fit in the target hardware block")]
    ProgramDoesNotFit,
}

/// The capability surface the controller engine consumes. See spec
/// §4.6 for the language-neutral method list this trait mirrors.
pub trait DshotHal {
    /// Opaque handle returned by a successful upload, passed back into
    /// [`Self::sm_configure`]; backends that have nothing to carry may
    /// use `()`.
    type ProgramHandle: Copy;

    /// Uploads the DShot PIO program to this HAL's hardware block if it
    /// has not been uploaded yet. Idempotent per hardware block (spec
    /// §3, §5).
    fn program_upload_once(&mut self) -> Result<Self::ProgramHandle, HalError>;

    /// (Re)configures the state machine to drive/sample `config.pin`.
    fn sm_configure(&mut self, program: Self::ProgramHandle, config: SmConfig);

    fn sm_start(&mut self);

    fn sm_stop(&mut self);

    /// Whether the transmit FIFO has room for another word.
    fn sm_tx_empty(&self) -> bool;

    /// Pushes one 32-bit word to the transmit FIFO. Precondition:
    /// [`Self::sm_tx_empty`] was true.
    fn sm_tx_push(&mut self, word: u32);

    /// Blocks until the hardware surfaces one captured 32-bit word.
    fn sm_rx_pop_blocking(&mut self) -> u32;

    fn system_clock_hz(&self) -> u32;

    /// Opaque monotonic timestamp, comparable only via [`Self::elapsed_us`].
    type Instant: Copy;

    fn monotonic_now(&self) -> Self::Instant;

    /// Signed microseconds elapsed from `earlier` to `later`.
    fn elapsed_us(&self, earlier: Self::Instant, later: Self::Instant) -> i64;
}
