//! GATT identifiers, command frames, and timing constants for the Myo band.
//!
//! All vendor UUIDs belong to the Myo namespace
//! `d506XXXX-a904-deb9-4748-2c7f4a124842` — identical except for the two
//! embedded role bytes.

use std::time::Duration;

use uuid::Uuid;

use crate::types::EmgMode;

/// Build a vendor UUID from its 16-bit role value.
const fn myo_uuid(role: u32) -> Uuid {
    Uuid::from_u128(0xd5060000_a904_deb9_4748_2c7f4a124842 | ((role as u128) << 96))
}

// ── Services ─────────────────────────────────────────────────────────────────

/// Primary control service advertised by the band.
///
/// Used both as the discovery match target (an advertisement counts only if
/// its declared service set contains this UUID) and as the parent of the
/// command characteristic.
pub const CONTROL_SERVICE: Uuid = myo_uuid(0x0001);

/// EMG data service carrying the four per-channel filtered characteristics.
pub const EMG_DATA_SERVICE: Uuid = myo_uuid(0x0005);

/// Vendor data service containing the rectified stream attribute.
///
/// The rectified attribute inside this service does not resolve by UUID on
/// the band's firmware; it is addressed by [`RECTIFIED_DATA_HANDLE`].
pub const VENDOR_DATA_SERVICE: Uuid = myo_uuid(0x0004);

// ── Characteristics ───────────────────────────────────────────────────────────

/// Write-only command characteristic inside [`CONTROL_SERVICE`].
///
/// Accepts [`NEVER_SLEEP_COMMAND`] and the frames built by
/// [`set_emg_mode_command`].
pub const COMMAND_CHARACTERISTIC: Uuid = myo_uuid(0x0401);

/// Filtered EMG characteristics, one per notification source.
///
/// Each delivers a 16-byte payload of two consecutive 8-channel signed
/// readings. All four must be subscribed for a complete filtered stream.
pub const EMG_DATA_CHARACTERISTICS: [Uuid; 4] = [
    myo_uuid(0x0105),
    myo_uuid(0x0205),
    myo_uuid(0x0305),
    myo_uuid(0x0405),
];

/// ATT handle of the rectified stream attribute inside [`VENDOR_DATA_SERVICE`].
pub const RECTIFIED_DATA_HANDLE: u16 = 0x27;

/// Standard Client Characteristic Configuration descriptor (0x2902).
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

// ── Command frames ────────────────────────────────────────────────────────────

/// Tell the band never to enter sleep mode.
///
/// Must be the first command of a session; without it the band drops the
/// link a few seconds after connecting.
pub const NEVER_SLEEP_COMMAND: [u8; 3] = [0x09, 0x01, 0x01];

/// CCCD value that enables notifications on a characteristic.
pub const NOTIFY_ENABLE: [u8; 2] = [0x01, 0x00];

/// Mandatory pause after every command write.
///
/// The band silently drops commands issued back to back within this window,
/// so every write is followed by this delay before the next attribute
/// operation.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Build the 5-byte set-streaming-mode frame for `mode`.
///
/// The third byte selects the wire format and is an empirically discovered
/// control byte with no documented meaning beyond the filtered/rectified
/// split; both values are reproduced exactly as the band expects them.
///
/// ```
/// # use myo_rs::protocol::set_emg_mode_command;
/// # use myo_rs::types::EmgMode;
/// assert_eq!(set_emg_mode_command(EmgMode::Filtered), [0x01, 0x03, 0x02, 0x00, 0x00]);
/// assert_eq!(set_emg_mode_command(EmgMode::Rectified), [0x01, 0x03, 0x01, 0x00, 0x00]);
/// ```
pub fn set_emg_mode_command(mode: EmgMode) -> [u8; 5] {
    let format = match mode {
        EmgMode::Filtered => 0x02,
        EmgMode::Rectified => 0x01,
    };
    [0x01, 0x03, format, 0x00, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_uuids_share_the_namespace() {
        assert_eq!(
            CONTROL_SERVICE,
            "d5060001-a904-deb9-4748-2c7f4a124842".parse::<Uuid>().unwrap()
        );
        assert_eq!(
            EMG_DATA_CHARACTERISTICS[3],
            "d5060405-a904-deb9-4748-2c7f4a124842".parse::<Uuid>().unwrap()
        );
        assert_eq!(
            VENDOR_DATA_SERVICE,
            "d5060004-a904-deb9-4748-2c7f4a124842".parse::<Uuid>().unwrap()
        );
    }

    #[test]
    fn command_frames_are_byte_exact() {
        assert_eq!(NEVER_SLEEP_COMMAND, [0x09, 0x01, 0x01]);
        assert_eq!(NOTIFY_ENABLE, [0x01, 0x00]);
        assert_eq!(set_emg_mode_command(EmgMode::Filtered)[2], 0x02);
        assert_eq!(set_emg_mode_command(EmgMode::Rectified)[2], 0x01);
    }
}
