//! The controller engine (spec §4.3): owns the hardware state machine,
//! the channel array, the active-channel cursor, and the two-phase
//! start/complete loop. Generic over [`DshotHal`] so it runs against
//! real PIO hardware or [`crate::hal::mock::MockHal`] identically.

use crate::channel::{MotorChannel, MAX_CHANNELS_PER_CONTROLLER};
use crate::codec::{decode_reverse, ReverseFrameStatus};
use crate::error::Error;
use crate::hal::{DshotHal, SmConfig};
use crate::telemetry::{self, TelemetryObserver};

/// The four standard DShot wire speeds (spec §3 "wire speed in
/// kilobits per second"). Grounded in the teacher's `encoder.rs`
/// `DShotSpeed`-shaped enum: four variants, one `const fn` accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireSpeed {
    Kbps150,
    Kbps300,
    Kbps600,
    Kbps1200,
}

impl WireSpeed {
    pub const fn bit_rate_hz(self) -> u32 {
        match self {
            Self::Kbps150 => 150_000,
            Self::Kbps300 => 300_000,
            Self::Kbps600 => 600_000,
            Self::Kbps1200 => 1_200_000,
        }
    }

    /// Accepts the raw `u16` kbps value host bindings pass per spec §6.
    pub fn from_kbps(kbps: u16) -> Result<Self, Error> {
        match kbps {
            150 => Ok(Self::Kbps150),
            300 => Ok(Self::Kbps300),
            600 => Ok(Self::Kbps600),
            1200 => Ok(Self::Kbps1200),
            other => Err(Error::InvalidWireSpeed { kbps: other }),
        }
    }
}

/// The PIO program runs at exactly 40x the DShot bit rate (spec §6).
const OVERSAMPLE_FACTOR: u32 = 40;

/// The idle-watchdog threshold (spec §4.5).
const IDLE_THRESHOLD_US: i64 = 200_000;

/// The 25 us receive window expressed independent of clock rate; the
/// controller converts this to IO-clock cycles at the current divisor
/// each time it starts a frame (spec §4.3 step 3, §6).
const RECEIVE_WINDOW_US: u32 = 25;

/// Arguments to [`Controller::init`] (spec §6's `init(...)` parameter
/// list, grouped the way the teacher groups PIO setup into a config
/// struct before calling `sm.set_config`).
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub wire_speed: WireSpeed,
    /// Carried for parity with spec §6's `init(...)` signature. The
    /// generic `H: DshotHal` passed to [`Controller::init`] already
    /// identifies its own hardware block and state machine (e.g.
    /// [`crate::hal::rp2040::Rp2040Hal::new`]'s `pio_block_index`), so
    /// the controller itself never reads these back.
    pub hw_block: usize,
    pub sm_index: usize,
    pub base_pin: u8,
    pub num_channels: usize,
}

/// Computes the Q16.8 fixed-point clock divisor bits `sm_configure`
/// expects, from `system_clock_hz / (wire_speed_hz * 40)` (spec §6).
/// Kept as plain integer arithmetic here so this module stays free of
/// the `fixed` crate, which only the rp2040 backend depends on; the
/// bit layout matches `fixed::FixedU32<U8>` so the rp2040 HAL can
/// reconstruct it directly from the bits.
fn compute_clkdiv_bits(system_clock_hz: u32, wire_speed: WireSpeed) -> Result<u32, Error> {
    let wire_speed_hz = wire_speed.bit_rate_hz();
    let divisor_hz = u64::from(wire_speed_hz) * u64::from(OVERSAMPLE_FACTOR);

    let bits = (u64::from(system_clock_hz) << 8) / divisor_hz;
    let integer_part = bits >> 8;

    if integer_part == 0 || integer_part > 0xFFFF || bits > u64::from(u32::MAX) {
        return Err(Error::ClockDividerOutOfRange { system_clock_hz, wire_speed_hz });
    }

    Ok(bits as u32)
}

/// Converts a 25 us wait into IO clock cycles at `clkdiv_bits`'
/// divisor, for the PIO program's receive-window spin loop.
fn receive_window_cycles(system_clock_hz: u32, clkdiv_bits: u32) -> u32 {
    let pio_clock_hz = (u64::from(system_clock_hz) << 8) / u64::from(clkdiv_bits);
    ((pio_clock_hz * u64::from(RECEIVE_WINDOW_US)) / 1_000_000) as u32
}

/// Owns one hardware state machine and the channels multiplexed onto
/// it. See spec §3 "Controller" for the full attribute/invariant list.
pub struct Controller<H: DshotHal> {
    hal: H,
    program: H::ProgramHandle,
    channels: [MotorChannel; MAX_CHANNELS_PER_CONTROLLER],
    num_channels: usize,
    active_channel: usize,
    base_pin: u8,
    clkdiv_bits: u32,
    system_clock_hz: u32,
    last_activity_time: H::Instant,
    observer: Option<&'static mut dyn TelemetryObserver>,
}

impl<H: DshotHal> Controller<H> {
    /// Uploads the PIO program if needed, configures channel 0's pin,
    /// computes the clock divisor, and zeroes every channel to
    /// throttle 0 (spec §3 "Lifecycle").
    pub fn init(mut hal: H, config: ControllerConfig) -> Result<Self, Error> {
        assert!(config.num_channels >= 1 && config.num_channels <= MAX_CHANNELS_PER_CONTROLLER);

        let program = hal.program_upload_once()?;
        let system_clock_hz = hal.system_clock_hz();
        let clkdiv_bits = compute_clkdiv_bits(system_clock_hz, config.wire_speed)?;

        hal.sm_configure(program, SmConfig { pin: config.base_pin, clkdiv_bits });
        hal.sm_start();

        let last_activity_time = hal.monotonic_now();

        let mut controller = Self {
            hal,
            program,
            channels: [MotorChannel::default(); MAX_CHANNELS_PER_CONTROLLER],
            num_channels: config.num_channels,
            active_channel: 0,
            base_pin: config.base_pin,
            clkdiv_bits,
            system_clock_hz,
            last_activity_time,
            observer: None,
        };

        for idx in 0..controller.num_channels {
            controller.set_throttle(idx, 0);
        }

        Ok(controller)
    }

    /// Registers the sole telemetry observer (spec §9: "pass by
    /// reference, do not own"). Replaces any previously registered one.
    pub fn register_telemetry(&mut self, observer: &'static mut dyn TelemetryObserver) {
        self.observer = Some(observer);
    }

    /// Latches throttle `value` on `channel_idx`. Out-of-range indexes
    /// are silently ignored per spec §4.2/§7.
    pub fn set_throttle(&mut self, channel_idx: usize, value: u16) {
        if channel_idx >= self.num_channels {
            return;
        }
        self.channels[channel_idx].set_throttle(value);
        self.last_activity_time = self.hal.monotonic_now();
    }

    /// Latches command `command_code` on `channel_idx` for
    /// [`crate::channel::COMMAND_REPEAT_COUNT`] loop iterations. Same
    /// out-of-range handling as [`Self::set_throttle`].
    pub fn send_command(&mut self, channel_idx: usize, command_code: u16) {
        if channel_idx >= self.num_channels {
            return;
        }
        self.channels[channel_idx].send_command(command_code);
        self.last_activity_time = self.hal.monotonic_now();
    }

    pub const fn active_channel(&self) -> usize {
        self.active_channel
    }

    pub fn channel_stats(&self, channel_idx: usize) -> Option<&crate::channel::RxStats> {
        self.channels.get(channel_idx).map(MotorChannel::stats)
    }

    /// Phase one of the loop (spec §4.3 "start"). Rotates the active
    /// channel, advances its command-repeat countdown, and — if the
    /// transmit queue has room — pushes this iteration's frame.
    pub fn start(&mut self) {
        if self.num_channels > 1 {
            self.hal.sm_stop();
            self.active_channel = (self.active_channel + 1) % self.num_channels;
            let pin = self.base_pin + self.active_channel as u8;
            self.hal.sm_configure(self.program, SmConfig { pin, clkdiv_bits: self.clkdiv_bits });
            self.hal.sm_start();
        }

        let channel = &mut self.channels[self.active_channel];
        channel.tick_command_counter();

        if self.hal.sm_tx_empty() {
            let frame = channel.frame();
            // Wire idles high; the IO program consumes the upper 16
            // bits of the pushed word (spec §4.3 step 3).
            let tx_word = u32::from(!frame) << 16;
            self.hal.sm_tx_push(tx_word);
            self.hal.sm_tx_push(receive_window_cycles(self.system_clock_hz, self.clkdiv_bits));
        }
    }

    /// Phase two of the loop (spec §4.3 "complete"). Blocks for the
    /// reverse-frame capture, feeds it to the codec and telemetry
    /// dispatcher, then checks the idle watchdog.
    pub fn complete(&mut self) {
        let raw = self.hal.sm_rx_pop_blocking();
        let (frame, status) = decode_reverse(raw);

        let active = self.active_channel;
        // Disjoint field borrows: `channels` and `observer` must be
        // borrowed independently here, not through a `&mut self` helper,
        // or the borrow checker sees them as conflicting.
        let channel = &mut self.channels[active];
        let observer: Option<&mut dyn TelemetryObserver> = match &mut self.observer {
            Some(o) => Some(&mut **o),
            None => None,
        };
        match status {
            ReverseFrameStatus::Ok => telemetry::dispatch(active, channel, frame, observer),
            ReverseFrameStatus::Empty => channel.record_timeout(),
            ReverseFrameStatus::GcrBad => channel.record_bad_gcr(),
            ReverseFrameStatus::CrcBad => channel.record_bad_crc(),
        }

        self.check_idle_watchdog();
    }

    /// Convenience: `start` then `complete` (spec §6 `loop(controller)`).
    pub fn loop_once(&mut self) {
        self.start();
        self.complete();
    }

    /// Spec §4.5: if no API activity occurred for >= 200 ms, force
    /// every channel back to throttle 0. Calling `set_throttle` itself
    /// refreshes `last_activity_time`, so this fires at most once per
    /// lost-heartbeat episode.
    fn check_idle_watchdog(&mut self) {
        let now = self.hal.monotonic_now();
        if self.hal.elapsed_us(self.last_activity_time, now) >= IDLE_THRESHOLD_US {
            #[cfg(feature = "defmt")]
            defmt::warn!("dshot: idle watchdog tripped, reverting all channels to throttle 0");
            for idx in 0..self.num_channels {
                self.set_throttle(idx, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::COMMAND_REPEAT_COUNT;
    use crate::codec::encode_forward;
    use crate::hal::mock::MockHal;
    use crate::telemetry::TelemetryKind;

    const SYSTEM_CLOCK_HZ: u32 = 120_000_000;

    fn init_controller(num_channels: usize) -> Controller<MockHal> {
        let hal = MockHal::new(SYSTEM_CLOCK_HZ);
        let config = ControllerConfig {
            wire_speed: WireSpeed::Kbps600,
            hw_block: 0,
            sm_index: 0,
            base_pin: 10,
            num_channels,
        };
        Controller::init(hal, config).expect("init should succeed on a healthy mock HAL")
    }

    #[test]
    fn init_fails_when_program_does_not_fit() {
        let mut hal = MockHal::new(SYSTEM_CLOCK_HZ);
        hal.fail_next_program_upload();
        let config = ControllerConfig {
            wire_speed: WireSpeed::Kbps600,
            hw_block: 0,
            sm_index: 0,
            base_pin: 10,
            num_channels: 1,
        };
        let err = Controller::init(hal, config).err().expect("should fail");
        assert_eq!(err, Error::ProgramDoesNotFit);
    }

    #[test]
    fn from_kbps_rejects_unsupported_wire_speed() {
        let err = WireSpeed::from_kbps(1000).err().expect("should fail");
        assert_eq!(err, Error::InvalidWireSpeed { kbps: 1000 });
    }

    #[test]
    fn compute_clkdiv_bits_rejects_zero_system_clock() {
        let err = compute_clkdiv_bits(0, WireSpeed::Kbps600).err().expect("should fail");
        assert_eq!(
            err,
            Error::ClockDividerOutOfRange { system_clock_hz: 0, wire_speed_hz: 600_000 }
        );
    }

    #[test]
    fn round_robin_visits_every_channel_exactly_once_per_cycle() {
        let mut controller = init_controller(4);
        let mut visited = std::vec::Vec::new();
        for _ in 0..4 {
            controller.start();
            visited.push(controller.active_channel());
        }
        assert_eq!(visited, std::vec![1, 2, 3, 0]);
    }

    #[test]
    fn scenario_f_command_restore() {
        let mut controller = init_controller(1);
        controller.set_throttle(0, 500);
        controller.send_command(0, 13);

        for _ in 0..(COMMAND_REPEAT_COUNT - 1) {
            controller.start();
            assert_eq!(decode_forward_tx(&controller), (13, true));
        }

        controller.start();
        assert_eq!(decode_forward_tx(&controller), (500, false));
    }

    fn decode_forward_tx(controller: &Controller<MockHal>) -> (u16, bool) {
        let tx_word = controller.hal.last_tx_frame().expect("start() should have pushed a frame");
        let inverted = (tx_word >> 16) as u16;
        crate::codec::decode_forward(!inverted)
    }

    #[test]
    fn idle_watchdog_reverts_all_channels_after_200ms_of_inactivity() {
        let mut controller = init_controller(2);
        controller.set_throttle(0, 400);
        controller.set_throttle(1, 600);

        controller.hal.advance_us(200_000);
        controller.start();
        controller.complete();

        for idx in 0..2 {
            assert_eq!(
                controller.channels[idx].last_throttle_frame(),
                encode_forward(0, false)
            );
        }
    }

    /// Writes each call into a process-wide static instead of `self` so
    /// the test can still read it out after handing the `&'static mut`
    /// reference to the controller (spec §9: the observer is borrowed,
    /// not owned, for the controller's whole lifetime).
    struct RecordingObserver;

    static LAST_TELEMETRY: std::sync::Mutex<Option<(usize, TelemetryKind, i32)>> =
        std::sync::Mutex::new(None);

    impl TelemetryObserver for RecordingObserver {
        fn on_telemetry(&mut self, channel: usize, kind: TelemetryKind, value: i32) {
            *LAST_TELEMETRY.lock().unwrap() = Some((channel, kind, value));
        }
    }

    #[test]
    fn complete_dispatches_decoded_telemetry_to_observer() {
        static OBSERVER: static_cell::StaticCell<RecordingObserver> = static_cell::StaticCell::new();
        let observer = OBSERVER.init(RecordingObserver);

        let mut controller = init_controller(1);

        // tag=0x0, e=5, m=0x0C8: period = 6400, eRPM = 9375 (spec Scenario B).
        let frame: u16 = (5u16 << 13) | (0x0C8 << 4);
        let crc = (!(frame >> 4 ^ (frame >> 8) ^ (frame >> 12))) & 0x0F;
        let gcr_frame = (frame & 0xFFF0) | crc;
        let raw = encode_as_raw_capture(gcr_frame);
        controller.hal.push_rx_word(raw);

        controller.register_telemetry(observer);
        controller.start();
        controller.complete();

        assert_eq!(*LAST_TELEMETRY.lock().unwrap(), Some((0, TelemetryKind::Erpm, 9375)));
    }

    /// Builds a raw 20-bit capture word that `decode_reverse` will turn
    /// back into `frame`, by inverting `gcr = raw ^ (raw >> 1)` and the
    /// GCR nibble table.
    fn encode_as_raw_capture(frame: u16) -> u32 {
        const GCR_ENCODE: [u32; 16] = [
            0x19, 0x1B, 0x12, 0x13, 0x1D, 0x15, 0x16, 0x17, 0x1A, 0x09, 0x0A, 0x0B, 0x1E, 0x0D,
            0x0E, 0x0F,
        ];
        let mut gcr: u32 = 0;
        for shift in [12, 8, 4, 0] {
            let nibble = ((frame >> shift) & 0xF) as usize;
            gcr = (gcr << 5) | GCR_ENCODE[nibble];
        }

        let mut raw = 0u32;
        let mut carry = 0u32;
        for bit in (0..20).rev() {
            let g = (gcr >> bit) & 1;
            let r = g ^ carry;
            raw |= r << bit;
            carry = r;
        }
        raw
    }
}
