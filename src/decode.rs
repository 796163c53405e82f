//! Binary decoders for EMG notification payloads.
//!
//! All functions here are pure and allocation-free; they are safe to call
//! from any async or sync context.
//!
//! The band produces two incompatible wire formats. Which decoder runs is
//! decided by the attribute that delivered the notification (see
//! [`DecodeKind`]), never by inspecting payload bytes — both formats can
//! coincidentally contain similar content.
//!
//! | Function | Payload | Layout |
//! |---|---|---|
//! | [`decode_filtered`] | 16 B | 16 × `i8`, two consecutive 8-channel readings |
//! | [`decode_rectified`] | 17 B | 8 × `u16` LE + 1 ignored trailing byte |
//!
//! Channel values are returned exactly as encoded on the wire; scaling is
//! the classifier's responsibility.

use thiserror::Error;

/// Number of EMG channels per reading.
pub const EMG_CHANNELS: usize = 8;

/// Exact payload length of a filtered notification.
pub const FILTERED_PAYLOAD_LEN: usize = 16;

/// Exact payload length of a rectified notification.
pub const RECTIFIED_PAYLOAD_LEN: usize = 17;

/// Which decoder an attribute's notifications are routed to.
///
/// The session builds a handle → `DecodeKind` table at subscribe time; this
/// is the explicit form of the binding between characteristic identity and
/// wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    Filtered,
    Rectified,
}

/// A notification payload that violates the wire contract.
///
/// Fatal only to that notification: the sample is dropped and logged, the
/// session keeps streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },
}

/// Decode a filtered notification into 16 signed channel values.
///
/// Each byte is reinterpreted as a two's-complement `i8`. Bytes 0–7 are one
/// 8-channel reading, bytes 8–15 the next.
///
/// ```
/// # use myo_rs::decode::decode_filtered;
/// let payload = [0x00, 0x7f, 0x80, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
/// let channels = decode_filtered(&payload).unwrap();
/// assert_eq!(&channels[..4], &[0, 127, -128, -1]);
/// ```
pub fn decode_filtered(payload: &[u8]) -> Result<[i8; FILTERED_PAYLOAD_LEN], DecodeError> {
    if payload.len() != FILTERED_PAYLOAD_LEN {
        return Err(DecodeError::MalformedPayload {
            expected: FILTERED_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    let mut channels = [0i8; FILTERED_PAYLOAD_LEN];
    for (out, &byte) in channels.iter_mut().zip(payload) {
        *out = byte as i8;
    }
    Ok(channels)
}

/// Decode a rectified notification into 8 unsigned channel values.
///
/// Bytes `2i` and `2i + 1` form channel `i` as a little-endian `u16`;
/// byte 16 is ignored by the format.
///
/// ```
/// # use myo_rs::decode::decode_rectified;
/// let mut payload = [0u8; 17];
/// payload[0] = 0x34;
/// payload[1] = 0x12;
/// let channels = decode_rectified(&payload).unwrap();
/// assert_eq!(channels[0], 0x1234);
/// ```
pub fn decode_rectified(payload: &[u8]) -> Result<[u16; EMG_CHANNELS], DecodeError> {
    if payload.len() != RECTIFIED_PAYLOAD_LEN {
        return Err(DecodeError::MalformedPayload {
            expected: RECTIFIED_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    let mut channels = [0u16; EMG_CHANNELS];
    for (i, out) in channels.iter_mut().enumerate() {
        *out = u16::from_le_bytes([payload[2 * i], payload[2 * i + 1]]);
    }
    Ok(channels)
}

// ── Armed latch ───────────────────────────────────────────────────────────────

/// Latches the classifier-armed flag for one session.
///
/// Starts false. The first observation of an active trigger level sets it,
/// and it never clears for the rest of the session — every later rectified
/// sample carries `true` regardless of the current trigger level.
#[derive(Debug, Default)]
pub struct ArmedLatch {
    armed: bool,
}

impl ArmedLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one trigger reading into the latch and return the latched state.
    pub fn observe(&mut self, trigger_active: bool) -> bool {
        if trigger_active {
            self.armed = true;
        }
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_round_trips_signed_bytes() {
        let values: [i8; 16] = [
            -128, -100, -1, 0, 1, 17, 127, -5, 42, -42, 99, -99, 7, -7, 64, -64,
        ];
        let payload: Vec<u8> = values.iter().map(|&v| v as u8).collect();
        assert_eq!(decode_filtered(&payload).unwrap(), values);
    }

    #[test]
    fn filtered_rejects_short_payload() {
        let err = decode_filtered(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MalformedPayload {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn rectified_decodes_little_endian_pairs() {
        let mut payload = [0u8; 17];
        for ch in 0..8u16 {
            let value = 0x0101 * (ch + 1);
            payload[2 * ch as usize] = value.to_le_bytes()[0];
            payload[2 * ch as usize + 1] = value.to_le_bytes()[1];
        }
        let channels = decode_rectified(&payload).unwrap();
        assert_eq!(
            channels,
            [0x0101, 0x0202, 0x0303, 0x0404, 0x0505, 0x0606, 0x0707, 0x0808]
        );
    }

    #[test]
    fn rectified_ignores_trailing_byte() {
        let mut payload = [0u8; 17];
        payload[0] = 0xcd;
        payload[1] = 0xab;
        let with_zero = decode_rectified(&payload).unwrap();
        payload[16] = 0xff;
        let with_ff = decode_rectified(&payload).unwrap();
        assert_eq!(with_zero, with_ff);
        assert_eq!(with_zero[0], 0xabcd);
    }

    #[test]
    fn rectified_rejects_wrong_lengths() {
        assert!(decode_rectified(&[0u8; 16]).is_err());
        assert!(decode_rectified(&[0u8; 18]).is_err());
    }

    #[test]
    fn armed_latch_is_permanent() {
        let mut latch = ArmedLatch::new();
        assert!(!latch.observe(false));
        assert!(!latch.observe(false));
        assert!(latch.observe(true));
        // Trigger returning to idle does not clear the latch.
        assert!(latch.observe(false));
        assert!(latch.observe(false));
    }
}
