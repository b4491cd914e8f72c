//! Telemetry dispatch: classifies a decoded reverse frame and forwards
//! the scaled value to a registered observer (spec §4.4).

use crate::codec::Classification;

/// The kind of extended-telemetry value a reply frame carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    Erpm,
    Voltage,
    Current,
    Temperature,
}

/// A narrow capability: receives classified telemetry for one channel.
///
/// Implementors must not mutate controller state and must not call back
/// into the driver — they may only read the value and emit it
/// externally (spec §9's "observer callback with opaque context", the
/// opaque context itself is whatever state the implementor closes over).
pub trait TelemetryObserver {
    fn on_telemetry(&mut self, channel: usize, kind: TelemetryKind, value: i32);
}

/// Dispatches a successfully decoded extended-telemetry frame: bumps
/// `rx_frames`, classifies it, and — unless the tag is reserved —
/// forwards `(channel, kind, value)` to `observer`.
///
/// Reserved tags bump `rx_bad_type` instead and are never dispatched.
pub(crate) fn dispatch(
    channel_idx: usize,
    channel: &mut crate::channel::MotorChannel,
    frame: u16,
    observer: Option<&mut dyn TelemetryObserver>,
) {
    match crate::codec::classify(frame) {
        Classification::Reserved => channel.record_bad_type(),
        classification => {
            channel.record_ok();
            if let Some(observer) = observer {
                let (kind, value) = match classification {
                    Classification::Erpm(v) => (TelemetryKind::Erpm, v as i32),
                    Classification::Voltage(v) => (TelemetryKind::Voltage, v as i32),
                    Classification::Current(v) => (TelemetryKind::Current, v as i32),
                    Classification::Temperature(v) => (TelemetryKind::Temperature, v as i32),
                    Classification::Reserved => unreachable!(),
                };
                observer.on_telemetry(channel_idx, kind, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MotorChannel;
    use std::vec::Vec;

    #[derive(Default)]
    struct RecordingObserver {
        calls: Vec<(usize, TelemetryKind, i32)>,
    }

    impl TelemetryObserver for RecordingObserver {
        fn on_telemetry(&mut self, channel: usize, kind: TelemetryKind, value: i32) {
            self.calls.push((channel, kind, value));
        }
    }

    #[test]
    fn reserved_tag_is_not_dispatched_and_counts_bad_type() {
        let mut channel = MotorChannel::default();
        let mut observer = RecordingObserver::default();
        let frame = (0x8u16 << 12) | (0x12 << 4);

        dispatch(0, &mut channel, frame, Some(&mut observer));

        assert!(observer.calls.is_empty());
        assert_eq!(channel.stats().rx_bad_type, 1);
        assert_eq!(channel.stats().rx_frames, 0);
    }

    #[test]
    fn erpm_frame_dispatches_and_counts_rx_frames() {
        let mut channel = MotorChannel::default();
        let mut observer = RecordingObserver::default();
        let frame = (5u16 << 13) | (0x0C8 << 4); // period 6400 -> 9375 erpm

        dispatch(2, &mut channel, frame, Some(&mut observer));

        assert_eq!(channel.stats().rx_frames, 1);
        assert_eq!(observer.calls, std::vec![(2, TelemetryKind::Erpm, 9375)]);
    }
}
