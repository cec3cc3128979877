//! Telemetry frame codec.
//!
//! Wire layout (4 bytes, little-endian): `[u16 height - BASE_OFFSET][i16 speed]`.
//! Extra trailing bytes are ignored.

use desk_traits::RawFrame;

use crate::error::DeskError;
use crate::types::HeightSample;

/// Height offset the desk subtracts before reporting (device units).
pub const BASE_OFFSET: u32 = 6200;

/// Minimum frame length carrying a height and a speed.
pub const FRAME_LEN: usize = 4;

/// Parse raw bytes into `(height, speed)`.
pub fn parse(bytes: &[u8]) -> Result<(u32, i32), DeskError> {
    let [h0, h1, s0, s1, ..] = *bytes else {
        return Err(DeskError::MalformedTelemetry(bytes.len()));
    };
    let raw = u16::from_le_bytes([h0, h1]);
    let speed = i16::from_le_bytes([s0, s1]);
    Ok((BASE_OFFSET + u32::from(raw), i32::from(speed)))
}

/// Decode raw bytes into `(height, speed)`. Malformed input is logged and yields `None`.
pub fn try_decode(bytes: &[u8]) -> Option<(u32, i32)> {
    parse(bytes)
        .map_err(|e| tracing::warn!(error = %e, "telemetry frame dropped"))
        .ok()
}

/// Decode a frame into a sample carrying the frame's timestamp.
pub fn decode(frame: &RawFrame) -> Option<HeightSample> {
    try_decode(&frame.bytes).map(|(height, speed)| HeightSample {
        timestamp: frame.timestamp,
        height,
        speed,
    })
}

/// Encode a `(height, speed)` pair. `None` when either value does not fit the wire format.
pub fn encode(height: u32, speed: i32) -> Option<[u8; FRAME_LEN]> {
    let raw = u16::try_from(height.checked_sub(BASE_OFFSET)?).ok()?;
    let speed = i16::try_from(speed).ok()?;
    let [h0, h1] = raw.to_le_bytes();
    let [s0, s1] = speed.to_le_bytes();
    Some([h0, h1, s0, s1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_offset_and_signed_speed() {
        assert_eq!(try_decode(&[0x10, 0x00, 0xFF, 0xFF]), Some((6216, -1)));
        assert_eq!(try_decode(&[0xFF, 0xFF, 0xFF, 0x7F]), Some((6200 + 65_535, 32_767)));
    }

    #[test]
    fn short_frames_are_dropped() {
        assert_eq!(try_decode(&[]), None);
        assert_eq!(try_decode(&[1, 2, 3]), None);
        assert_eq!(parse(&[1, 2, 3]), Err(DeskError::MalformedTelemetry(3)));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        assert_eq!(try_decode(&[0, 0, 0, 0, 9, 9]), Some((6200, 0)));
    }

    #[test]
    fn encode_rejects_unrepresentable_values() {
        assert_eq!(encode(6199, 0), None);
        assert_eq!(encode(6200 + 65_536, 0), None);
        assert_eq!(encode(7000, 40_000), None);
        assert_eq!(encode(6216, -1), Some([0x10, 0x00, 0xFF, 0xFF]));
    }
}
