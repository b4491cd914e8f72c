//! Pure frame encoding/decoding: forward DShot frames and reverse
//! extended-telemetry (GCR) frames. No hardware, no state, no allocation.

use num_enum::TryFromPrimitive;

/// Result of decoding a raw 20-bit inverted-GCR reverse frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseFrameStatus {
    /// CRC verified; the extended-telemetry frame is valid.
    Ok,
    /// One or more 5-bit quintets did not map to a GCR table entry.
    GcrBad,
    /// GCR decode succeeded but the CRC nibble did not match.
    CrcBad,
    /// The raw word was zero; no reply was captured within the window.
    Empty,
}

/// A classified, scaled extended-telemetry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Electrical RPM, already divided out of the period.
    Erpm(u32),
    /// Volts, already scaled from the raw quarter-volt magnitude.
    Voltage(u16),
    /// Raw current magnitude, ESC-defined units.
    Current(u16),
    /// Raw temperature magnitude, ESC-defined units.
    Temperature(u16),
    /// A type tag with no assigned meaning in this spec.
    Reserved,
}

/// Commands that occupy the lower 48 values of the 11-bit DShot field.
/// Values 48..=2047 are throttle and are never represented here; the
/// driver itself does not enforce the split (spec §6), this enum is a
/// convenience for callers that already know they're sending a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum Command {
    MotorStop = 0,
    Beacon1 = 1,
    Beacon2 = 2,
    Beacon3 = 3,
    Beacon4 = 4,
    Beacon5 = 5,
    EscInfo = 6,
    SpinDirection1 = 7,
    SpinDirection2 = 8,
    ThreeDModeOff = 9,
    ThreeDModeOn = 10,
    SettingsRequest = 11,
    SettingsSave = 12,
    ExtendedTelemetryEnable = 13,
    ExtendedTelemetryDisable = 14,
    SpinDirectionNormal = 20,
    SpinDirectionReversed = 21,
}

const fn forward_crc(data12: u16) -> u16 {
    (!(data12 ^ (data12 >> 4) ^ (data12 >> 8))) & 0x0F
}

/// Encodes an 11-bit command/throttle `value` and the telemetry-request
/// bit into a 16-bit forward DShot frame.
///
/// `value` is expected to already fit in 11 bits; the caller (command vs.
/// throttle split) is responsible for that range per spec §6.
pub const fn encode_forward(value: u16, telemetry_request: bool) -> u16 {
    let data12 = (value << 1) | (telemetry_request as u16);
    (data12 << 4) | forward_crc(data12)
}

/// Recovers `(value, telemetry_request)` from a forward frame without
/// checking its CRC — used by property tests and by callers that trust
/// a frame they just encoded themselves.
pub const fn decode_forward(frame: u16) -> (u16, bool) {
    let data12 = frame >> 4;
    (data12 >> 1, (data12 & 0x01) != 0)
}

/// Fixed 5-bit GCR quintet -> 4-bit nibble table (spec §4.1). `None`
/// entries are not valid GCR code words.
const GCR_DECODE: [Option<u8>; 32] = {
    let mut table = [None; 32];
    table[0x19] = Some(0x0);
    table[0x1B] = Some(0x1);
    table[0x12] = Some(0x2);
    table[0x13] = Some(0x3);
    table[0x1D] = Some(0x4);
    table[0x15] = Some(0x5);
    table[0x16] = Some(0x6);
    table[0x17] = Some(0x7);
    table[0x1A] = Some(0x8);
    table[0x09] = Some(0x9);
    table[0x0A] = Some(0xA);
    table[0x0B] = Some(0xB);
    table[0x1E] = Some(0xC);
    table[0x0D] = Some(0xD);
    table[0x0E] = Some(0xE);
    table[0x0F] = Some(0xF);
    table
};

const fn reverse_crc(data12: u16) -> u16 {
    (!(data12 ^ (data12 >> 4) ^ (data12 >> 8))) & 0x0F
}

/// Decodes a raw 20-bit inverted-GCR capture into a 16-bit
/// extended-telemetry frame plus a status.
///
/// `raw` carries the 20 meaningful bits in its low bits; a hardware
/// capture word wider than 20 bits (e.g. a 32-bit PIO sample) should be
/// masked down by the caller, or is masked here regardless.
pub fn decode_reverse(raw: u32) -> (u16, ReverseFrameStatus) {
    if raw == 0 {
        return (0, ReverseFrameStatus::Empty);
    }

    let gcr = (raw ^ (raw >> 1)) & 0xFFFFF;

    let mut frame: u16 = 0;
    for quintet_idx in 0..4 {
        let shift = (3 - quintet_idx) * 5;
        let quintet = ((gcr >> shift) & 0x1F) as usize;
        let Some(nibble) = GCR_DECODE[quintet] else {
            return (0, ReverseFrameStatus::GcrBad);
        };
        frame = (frame << 4) | nibble as u16;
    }

    let crc = frame & 0x0F;
    let expected = reverse_crc(frame >> 4);
    if crc != expected {
        return (0, ReverseFrameStatus::CrcBad);
    }

    (frame, ReverseFrameStatus::Ok)
}

/// `0xFF80` is the only stopped-motor sentinel this spec assigns
/// special handling; see the Open Question in spec.md §9 about whether
/// ESC firmware defines others.
const STOPPED_MOTOR_PERIOD: u32 = 0xFF80;

/// Classifies a decoded extended-telemetry frame and applies the
/// per-type numeric transform.
pub fn classify(frame: u16) -> Classification {
    let m = ((frame >> 4) & 0x1FF) as u32;
    let e = (frame >> 13) & 0x7;
    let tag = (frame >> 12) & 0xF;

    match tag {
        0x2 => Classification::Temperature(m as u16),
        0x4 => Classification::Voltage((m / 4) as u16),
        0x6 => Classification::Current(m as u16),
        0x8 | 0xA | 0xC | 0xE => Classification::Reserved,
        _ => {
            let period = m << e;
            let erpm = if period == STOPPED_MOTOR_PERIOD || period == 0 {
                0
            } else {
                60_000_000 / period
            };
            Classification::Erpm(erpm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_round_trip_all_values_and_telemetry_bits() {
        for value in 0u16..=2047 {
            for tr in [false, true] {
                let frame = encode_forward(value, tr);
                assert_eq!(decode_forward(frame), (value, tr));

                let data12 = frame >> 4;
                let crc = frame & 0x0F;
                let check = (data12 ^ (data12 >> 4) ^ (data12 >> 8)) & 0x0F;
                assert_eq!(crc ^ check, 0x0F);
            }
        }
    }

    /// Inverts `gcr = raw ^ (raw >> 1)` to recover a raw 20-bit capture
    /// word that decodes to the given post-xor `gcr` value.
    fn raw_for_gcr(gcr: u32) -> u32 {
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

    #[test]
    fn reverse_decode_rejects_non_gcr_words() {
        // Quintet 0b00000 has no entry in the GCR table.
        let gcr = 0b00000_11001_11001_11001u32;
        let raw = raw_for_gcr(gcr);
        assert_ne!(raw, 0);
        let (_, status) = decode_reverse(raw);
        assert_eq!(status, ReverseFrameStatus::GcrBad);
    }

    #[test]
    fn decode_reverse_empty_on_zero() {
        assert_eq!(decode_reverse(0), (0, ReverseFrameStatus::Empty));
    }

    #[test]
    fn classify_reserved_tags_produce_no_value() {
        for tag in [0x8u16, 0xA, 0xC, 0xE] {
            let frame = (tag << 12) | (0x34 << 4) | 0x0;
            assert_eq!(classify(frame), Classification::Reserved);
        }
    }

    #[test]
    fn classify_erpm_scenario_b() {
        // tag=0x0, e=5, m=0x0C8: period = 0xC8 << 5 = 6400, eRPM = 9375.
        let e: u16 = 5;
        let m: u16 = 0x0C8;
        let frame = (e << 13) | (m << 4);
        assert_eq!(classify(frame), Classification::Erpm(9375));
    }

    #[test]
    fn classify_stopped_motor_sentinel() {
        // m=0x1FF, e=7: period = 0x1FF << 7 = 0xFF80, the sentinel.
        let frame = (0x7u16 << 13) | (0x1FFu16 << 4);
        assert_eq!(classify(frame), Classification::Erpm(0));

        // Zero period (m=0) also classifies as a stopped motor.
        assert_eq!(classify(0), Classification::Erpm(0));
    }

    #[test]
    fn classify_temperature_scenario_d() {
        let frame = (0x2u16 << 12) | (0x2Du16 << 4);
        assert_eq!(classify(frame), Classification::Temperature(45));
    }

    #[test]
    fn classify_voltage_scenario_e() {
        let frame = (0x4u16 << 12) | (0x60u16 << 4);
        assert_eq!(classify(frame), Classification::Voltage(24));
    }

    #[test]
    fn command_try_from_accepts_defined_values_only() {
        assert_eq!(Command::try_from(0u16), Ok(Command::MotorStop));
        assert_eq!(Command::try_from(13u16), Ok(Command::ExtendedTelemetryEnable));
        assert!(Command::try_from(15u16).is_err());
        assert!(Command::try_from(48u16).is_err());
    }
}
