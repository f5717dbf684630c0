//! VISCA command encoding
//!
//! Pure translation of PTZ intents into VISCA payloads. Every payload starts
//! with the address byte `0x81` (camera 1 on this connection) and ends with the
//! `0xFF` terminator. Nothing in this module performs I/O.

/// Highest legal pan/tilt speed (0x18)
pub const MAX_PAN_TILT_SPEED: u8 = 24;

/// Highest legal variable zoom speed
pub const MAX_ZOOM_SPEED: u8 = 7;

/// Lowest preset slot accepted from callers (1-based)
pub const MIN_PRESET_SLOT: u8 = 1;

/// Highest preset slot accepted from callers (1-based)
pub const MAX_PRESET_SLOT: u8 = 127;

const ADDRESS: u8 = 0x81;
const TERMINATOR: u8 = 0xFF;

const PAN_LEFT: u8 = 0x01;
const PAN_RIGHT: u8 = 0x02;
const TILT_UP: u8 = 0x01;
const TILT_DOWN: u8 = 0x02;
const AXIS_IDLE: u8 = 0x03;

const ZOOM_TELE: u8 = 0x20;
const ZOOM_WIDE: u8 = 0x30;

const PRESET_STORE: u8 = 0x01;
const PRESET_RECALL: u8 = 0x02;

/// Pan/tilt position inquiry (`CAM_PanTiltPosInq`)
pub const PAN_TILT_POSITION_INQUIRY: [u8; 5] = [ADDRESS, 0x09, 0x06, 0x12, TERMINATOR];

/// Zoom position inquiry (`CAM_ZoomPosInq`)
pub const ZOOM_POSITION_INQUIRY: [u8; 5] = [ADDRESS, 0x09, 0x04, 0x47, TERMINATOR];

/// Preset slot numbering used on the wire.
///
/// Camera firmware disagrees on whether preset `PP` is 0- or 1-based, so both
/// encodings are available and the caller decides the order to try them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetNumbering {
    /// `PP` is the caller's slot unchanged
    OneBased,
    /// `PP` is the caller's slot minus one
    ZeroBased,
}

impl PresetNumbering {
    /// The order in which preset encodings are attempted
    pub const FALLBACK_ORDER: [PresetNumbering; 2] =
        [PresetNumbering::OneBased, PresetNumbering::ZeroBased];
}

/// A PTZ intent that maps to exactly one VISCA payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtzCommand {
    /// Variable-speed pan/tilt; (0, 0) becomes the explicit stop
    MoveAtSpeed { pan: i32, tilt: i32 },
    /// Literal variable-speed drive opcode, never replaced by the stop sequence
    PanTiltDrive { pan: i32, tilt: i32 },
    /// Explicit pan/tilt stop
    Stop,
    /// Variable-speed zoom; 0 becomes the explicit zoom stop
    ZoomAtSpeed(i32),
    /// Explicit zoom stop
    ZoomStop,
    /// Absolute zoom position
    ZoomToRatio(u32),
    /// Store the current position in a 1-based slot
    StorePreset(u8),
    /// Recall a 1-based slot
    RecallPreset(u8),
}

impl PtzCommand {
    /// Encode with 1-based preset numbering
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with(PresetNumbering::OneBased)
    }

    /// Encode, choosing the preset numbering explicitly
    pub fn encode_with(&self, numbering: PresetNumbering) -> Vec<u8> {
        match *self {
            PtzCommand::MoveAtSpeed { pan, tilt } => encode_move(pan, tilt),
            PtzCommand::PanTiltDrive { pan, tilt } => encode_pan_tilt_drive(pan, tilt),
            PtzCommand::Stop => encode_pan_tilt_stop(),
            PtzCommand::ZoomAtSpeed(speed) => encode_zoom(speed),
            PtzCommand::ZoomStop => encode_zoom_stop(),
            PtzCommand::ZoomToRatio(ratio) => encode_zoom_ratio(ratio),
            PtzCommand::StorePreset(slot) => encode_store_preset(slot, numbering),
            PtzCommand::RecallPreset(slot) => encode_recall_preset(slot, numbering),
        }
    }

    /// Whether the payload depends on preset numbering
    pub fn is_preset(&self) -> bool {
        matches!(self, PtzCommand::StorePreset(_) | PtzCommand::RecallPreset(_))
    }

    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            PtzCommand::MoveAtSpeed { .. } => "move",
            PtzCommand::PanTiltDrive { .. } => "drive",
            PtzCommand::Stop => "pan/tilt stop",
            PtzCommand::ZoomAtSpeed(_) => "zoom",
            PtzCommand::ZoomStop => "zoom stop",
            PtzCommand::ZoomToRatio(_) => "zoom to ratio",
            PtzCommand::StorePreset(_) => "store preset",
            PtzCommand::RecallPreset(_) => "recall preset",
        }
    }
}

fn pan_direction(pan: i32) -> u8 {
    match pan.signum() {
        1 => PAN_RIGHT,
        -1 => PAN_LEFT,
        _ => AXIS_IDLE,
    }
}

fn tilt_direction(tilt: i32) -> u8 {
    match tilt.signum() {
        1 => TILT_UP,
        -1 => TILT_DOWN,
        _ => AXIS_IDLE,
    }
}

fn clamp_speed(speed: i32, min: u8, max: u8) -> u8 {
    speed.unsigned_abs().clamp(min as u32, max as u32) as u8
}

/// Pan/tilt at speed. Positive pan is right, positive tilt is up.
///
/// Magnitudes are clamped to 24. When both speeds are zero the explicit stop
/// sequence is returned instead of a zero-speed move.
pub fn encode_move(pan: i32, tilt: i32) -> Vec<u8> {
    if pan == 0 && tilt == 0 {
        return encode_pan_tilt_stop();
    }
    vec![
        ADDRESS,
        0x01,
        0x06,
        0x01,
        clamp_speed(pan, 0, MAX_PAN_TILT_SPEED),
        clamp_speed(tilt, 0, MAX_PAN_TILT_SPEED),
        pan_direction(pan),
        tilt_direction(tilt),
        TERMINATOR,
    ]
}

/// Pan/tilt drive opcode with speed bytes held in the legal 1..=24 range.
///
/// Unlike [`encode_move`] this never substitutes the stop sequence, so
/// `encode_pan_tilt_drive(0, 0)` is a drive command carrying idle directions.
pub fn encode_pan_tilt_drive(pan: i32, tilt: i32) -> Vec<u8> {
    vec![
        ADDRESS,
        0x01,
        0x06,
        0x01,
        clamp_speed(pan, 1, MAX_PAN_TILT_SPEED),
        clamp_speed(tilt, 1, MAX_PAN_TILT_SPEED),
        pan_direction(pan),
        tilt_direction(tilt),
        TERMINATOR,
    ]
}

/// Explicit pan/tilt stop
pub fn encode_pan_tilt_stop() -> Vec<u8> {
    vec![
        ADDRESS, 0x01, 0x06, 0x01, 0x00, 0x00, AXIS_IDLE, AXIS_IDLE, TERMINATOR,
    ]
}

/// Variable-speed zoom. Positive is tele (in), negative is wide (out).
pub fn encode_zoom(speed: i32) -> Vec<u8> {
    let family = match speed.signum() {
        1 => ZOOM_TELE,
        -1 => ZOOM_WIDE,
        _ => return encode_zoom_stop(),
    };
    let p = clamp_speed(speed, 1, MAX_ZOOM_SPEED);
    vec![ADDRESS, 0x01, 0x04, 0x07, family | p, TERMINATOR]
}

/// Explicit zoom stop
pub fn encode_zoom_stop() -> Vec<u8> {
    vec![ADDRESS, 0x01, 0x04, 0x07, 0x00, TERMINATOR]
}

/// Absolute zoom position, clamped to 16 bits and sent one nibble per byte
pub fn encode_zoom_ratio(ratio: u32) -> Vec<u8> {
    let value = ratio.min(u16::MAX as u32) as u16;
    let [n3, n2, n1, n0] = pack_nibbles(value);
    vec![ADDRESS, 0x01, 0x04, 0x47, n3, n2, n1, n0, TERMINATOR]
}

/// Store preset (`CAM_Memory Set`)
pub fn encode_store_preset(slot: u8, numbering: PresetNumbering) -> Vec<u8> {
    encode_preset(PRESET_STORE, slot, numbering)
}

/// Recall preset (`CAM_Memory Recall`)
pub fn encode_recall_preset(slot: u8, numbering: PresetNumbering) -> Vec<u8> {
    encode_preset(PRESET_RECALL, slot, numbering)
}

fn encode_preset(operation: u8, slot: u8, numbering: PresetNumbering) -> Vec<u8> {
    let slot = slot.clamp(MIN_PRESET_SLOT, MAX_PRESET_SLOT);
    let pp = match numbering {
        PresetNumbering::OneBased => slot,
        PresetNumbering::ZeroBased => slot - 1,
    };
    vec![ADDRESS, 0x01, 0x04, 0x3F, operation, pp, TERMINATOR]
}

/// Quantize a UI zoom speed to the integer VISCA range.
///
/// Zero stays zero. Any other value keeps its sign and gets a magnitude in
/// 1..=7, so a small fractional request never collapses into a stop.
pub fn quantize_zoom_speed(speed: f64) -> i32 {
    if speed == 0.0 || speed.is_nan() {
        return 0;
    }
    let magnitude = speed.abs().round().clamp(1.0, MAX_ZOOM_SPEED as f64) as i32;
    if speed > 0.0 {
        magnitude
    } else {
        -magnitude
    }
}

/// Split a 16-bit value into four nibbles, most significant first
pub fn pack_nibbles(value: u16) -> [u8; 4] {
    [
        ((value >> 12) & 0x0F) as u8,
        ((value >> 8) & 0x0F) as u8,
        ((value >> 4) & 0x0F) as u8,
        (value & 0x0F) as u8,
    ]
}

/// Reassemble four nibble bytes. Returns `None` if any byte has high bits set.
pub fn unpack_nibbles(bytes: &[u8]) -> Option<u16> {
    if bytes.len() != 4 || bytes.iter().any(|b| b & 0xF0 != 0) {
        return None;
    }
    Some(bytes.iter().fold(0u16, |acc, b| (acc << 4) | *b as u16))
}

fn is_completion_reply(reply: &[u8], expected_len: usize) -> bool {
    reply.len() == expected_len
        && reply[0] & 0xF0 == 0x90
        && reply[1] == 0x50
        && reply[expected_len - 1] == TERMINATOR
}

/// Decode a pan/tilt position reply: `y0 50 0p 0p 0p 0p 0t 0t 0t 0t FF`
pub fn decode_pan_tilt_position(reply: &[u8]) -> Option<(i16, i16)> {
    if !is_completion_reply(reply, 11) {
        return None;
    }
    let pan = unpack_nibbles(&reply[2..6])? as i16;
    let tilt = unpack_nibbles(&reply[6..10])? as i16;
    Some((pan, tilt))
}

/// Decode a zoom position reply: `y0 50 0p 0p 0p 0p FF`
pub fn decode_zoom_position(reply: &[u8]) -> Option<u16> {
    if !is_completion_reply(reply, 7) {
        return None;
    }
    unpack_nibbles(&reply[2..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_speed_field_and_direction() {
        for speed in -24..=24 {
            if speed == 0 {
                continue;
            }
            let bytes = encode_move(speed, 0);
            assert_eq!(bytes.len(), 9);
            assert_eq!(bytes[4] as i32, speed.abs());
            assert_eq!(bytes[5], 0x00);
            let expected_dir = if speed > 0 { 0x02 } else { 0x01 };
            assert_eq!(bytes[6], expected_dir, "pan direction for speed {}", speed);
            assert_eq!(bytes[7], 0x03);
        }
    }

    #[test]
    fn test_move_clamps_out_of_range() {
        assert_eq!(encode_move(100, -100)[4..8], [24, 24, 0x02, 0x02]);
        assert_eq!(encode_move(i32::MIN, 0)[4], 24);
    }

    #[test]
    fn test_zero_move_is_explicit_stop() {
        assert_eq!(
            encode_move(0, 0),
            vec![0x81, 0x01, 0x06, 0x01, 0x00, 0x00, 0x03, 0x03, 0xFF]
        );
        assert_eq!(PtzCommand::MoveAtSpeed { pan: 0, tilt: 0 }.encode(), encode_pan_tilt_stop());
    }

    #[test]
    fn test_drive_keeps_legal_speed_bytes() {
        assert_eq!(
            encode_pan_tilt_drive(0, 0),
            vec![0x81, 0x01, 0x06, 0x01, 0x01, 0x01, 0x03, 0x03, 0xFF]
        );
        assert_ne!(encode_pan_tilt_drive(0, 0), encode_pan_tilt_stop());
        assert_eq!(encode_pan_tilt_drive(-3, 30)[4..8], [3, 24, 0x01, 0x01]);
    }

    #[test]
    fn test_zoom_families() {
        for speed in -7i32..=7 {
            let magnitude = speed.unsigned_abs() as u8;
            let zoom_byte = match speed.signum() {
                1 => 0x20 | magnitude,
                -1 => 0x30 | magnitude,
                _ => 0x00,
            };
            assert_eq!(encode_zoom(speed), vec![0x81, 0x01, 0x04, 0x07, zoom_byte, 0xFF]);
        }
        assert_eq!(encode_zoom(42)[4], 0x27);
        assert_eq!(encode_zoom(-42)[4], 0x37);
    }

    #[test]
    fn test_quantize_zoom_speed_never_collapses_to_stop() {
        assert_eq!(quantize_zoom_speed(0.0), 0);
        assert_eq!(quantize_zoom_speed(0.2), 1);
        assert_eq!(quantize_zoom_speed(-0.4), -1);
        assert_eq!(quantize_zoom_speed(3.6), 4);
        assert_eq!(quantize_zoom_speed(-99.0), -7);
        assert_eq!(quantize_zoom_speed(f64::NAN), 0);
    }

    #[test]
    fn test_zoom_ratio_nibbles_reconstruct() {
        for ratio in [0u32, 1000, 4096, 12000, 65535] {
            let bytes = encode_zoom_ratio(ratio);
            assert_eq!(bytes[..4], [0x81, 0x01, 0x04, 0x47]);
            assert_eq!(bytes[8], 0xFF);
            assert_eq!(unpack_nibbles(&bytes[4..8]), Some(ratio as u16));
        }
        assert_eq!(unpack_nibbles(&encode_zoom_ratio(70000)[4..8]), Some(0xFFFF));
        assert_eq!(encode_zoom_ratio(0x1234)[4..8], [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_preset_numbering() {
        assert_eq!(
            encode_store_preset(5, PresetNumbering::OneBased),
            vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x05, 0xFF]
        );
        assert_eq!(
            encode_store_preset(5, PresetNumbering::ZeroBased),
            vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x04, 0xFF]
        );
        assert_eq!(
            encode_recall_preset(1, PresetNumbering::ZeroBased),
            vec![0x81, 0x01, 0x04, 0x3F, 0x02, 0x00, 0xFF]
        );
        // Out-of-range slots are clamped, not rejected
        assert_eq!(encode_recall_preset(0, PresetNumbering::ZeroBased)[5], 0x00);
        assert_eq!(encode_recall_preset(200, PresetNumbering::OneBased)[5], 127);
    }

    #[test]
    fn test_decode_pan_tilt_position() {
        let reply = [0x90, 0x50, 0x0F, 0x0F, 0x0F, 0x0E, 0x00, 0x01, 0x02, 0x03, 0xFF];
        assert_eq!(decode_pan_tilt_position(&reply), Some((-2, 0x0123)));

        let mut bad = reply;
        bad[3] = 0x1F;
        assert_eq!(decode_pan_tilt_position(&bad), None);
        assert_eq!(decode_pan_tilt_position(&reply[..10]), None);
    }

    #[test]
    fn test_decode_zoom_position() {
        let reply = [0x90, 0x50, 0x02, 0x0E, 0x0E, 0x00, 0xFF];
        assert_eq!(decode_zoom_position(&reply), Some(12000));
        // Error reply: y0 60 02 FF
        assert_eq!(decode_zoom_position(&[0x90, 0x60, 0x02, 0xFF]), None);
    }
}
