//! Per-channel state: the current outbound frame, the throttle frame to
//! restore after a command burst, and rolling receive statistics.

use crate::codec::encode_forward;

/// Upper bound on channels a single controller/state-machine can
/// multiplex. Mirrors `DSHOT_MAX_CHANNELS_PER_CONTROLLER` in the
/// reference firmware, raised from 1 to a practical ceiling for a
/// round-robin multi-channel controller.
pub const MAX_CHANNELS_PER_CONTROLLER: usize = 8;

/// How many loop iterations a command frame stays latched before the
/// channel reverts to its last throttle frame (spec §4.2).
pub const COMMAND_REPEAT_COUNT: u8 = 12;

/// Rolling receive counters for one channel. Monotonically
/// non-decreasing for the lifetime of the controller (spec §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    pub rx_frames: u32,
    pub rx_bad_gcr: u32,
    pub rx_bad_crc: u32,
    pub rx_bad_type: u32,
    pub rx_timeout: u32,
}

/// One motor channel's latched frame state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorChannel {
    frame: u16,
    last_throttle_frame: u16,
    command_counter: u8,
    stats: RxStats,
}

impl Default for MotorChannel {
    fn default() -> Self {
        let idle = encode_forward(0, false);
        Self {
            frame: idle,
            last_throttle_frame: idle,
            command_counter: 0,
            stats: RxStats::default(),
        }
    }
}

impl MotorChannel {
    /// The frame currently due to go out on the wire.
    pub const fn frame(&self) -> u16 {
        self.frame
    }

    /// The most recently latched throttle frame, restored once a
    /// command burst finishes.
    pub const fn last_throttle_frame(&self) -> u16 {
        self.last_throttle_frame
    }

    /// Remaining loop iterations the current command frame will be
    /// retransmitted for before reverting to throttle.
    pub const fn command_counter(&self) -> u8 {
        self.command_counter
    }

    pub const fn stats(&self) -> &RxStats {
        &self.stats
    }

    /// Latches a throttle frame: `frame` and `last_throttle_frame` both
    /// become `encode_forward(value, false)`, and any in-progress
    /// command burst is cancelled (spec §4.2).
    pub fn set_throttle(&mut self, value: u16) {
        let frame = encode_forward(value, false);
        self.frame = frame;
        self.last_throttle_frame = frame;
        self.command_counter = 0;
    }

    /// Latches a command frame with telemetry requested, to be
    /// retransmitted for [`COMMAND_REPEAT_COUNT`] loop iterations
    /// before the throttle frame is restored (spec §4.2).
    pub fn send_command(&mut self, command: u16) {
        self.frame = encode_forward(command, true);
        self.command_counter = COMMAND_REPEAT_COUNT;
    }

    /// Called once per loop iteration while this channel is active.
    /// Decrements the command counter and restores the throttle frame
    /// the instant it reaches zero (spec §4.3 step 2).
    pub(crate) fn tick_command_counter(&mut self) {
        if self.command_counter > 0 {
            self.command_counter -= 1;
            if self.command_counter == 0 {
                self.frame = self.last_throttle_frame;
            }
        }
    }

    pub(crate) fn record_ok(&mut self) {
        self.stats.rx_frames += 1;
    }

    pub(crate) fn record_bad_gcr(&mut self) {
        self.stats.rx_bad_gcr += 1;
    }

    pub(crate) fn record_bad_crc(&mut self) {
        self.stats.rx_bad_crc += 1;
    }

    pub(crate) fn record_bad_type(&mut self) {
        self.stats.rx_bad_type += 1;
    }

    pub(crate) fn record_timeout(&mut self) {
        self.stats.rx_timeout += 1;
    }
}
