//! Configuration-fatal error taxonomy (spec §7). Transient wire errors
//! never appear here — they are folded into [`crate::channel::RxStats`].

use crate::hal::HalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum Error {
    /// The DShot PIO program does not fit in the target hardware block.
    #[error("DShot PIO program does not fit in the target hardware block")]
    ProgramDoesNotFit,
    /// `wire_speed_kbps` was not one of 150/300/600/1200.
    ///
    /// Unreachable through [`crate::controller::WireSpeed`], which only
    /// has the four valid variants; kept for the raw-`u16` constructor
    /// host bindings use per spec §6.
    #[error("invalid wire speed: {kbps} kbps")]
    InvalidWireSpeed { kbps: u16 },
    /// The computed clock divisor does not fit the PIO's fixed-point
    /// divider width (mirrors the teacher's `ClockDividerConversionError`).
    #[error("clock divider out of range: system clock {system_clock_hz} Hz, wire speed {wire_speed_hz} Hz")]
    ClockDividerOutOfRange { system_clock_hz: u32, wire_speed_hz: u32 },
}

impl From<HalError> for Error {
    fn from(err: HalError) -> Self {
        match err {
            HalError::ProgramDoesNotFit => Error::ProgramDoesNotFit,
        }
    }
}
