use thiserror::Error;
use uuid::Uuid;

use crate::transport::TransportError;

/// Streaming format requested from the band at session setup.
///
/// The band is never asked which mode it is in; the mode is implied by the
/// command sequence sent during establishment and by which attribute the
/// session subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmgMode {
    /// Per-channel signed 8-bit stream over the four standard EMG
    /// characteristics. 16-byte payloads, two 8-channel readings each.
    Filtered,
    /// Pre-rectified unsigned 16-bit stream over the single vendor attribute
    /// addressed by handle. 17-byte payloads, one 8-channel reading each.
    Rectified,
}

/// One decoded EMG notification.
///
/// Channel values are emitted exactly as encoded on the wire; scaling and
/// calibration are the downstream classifier's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmgSample {
    /// Two consecutive 8-channel readings: channels 0–7 then 8–15.
    Filtered { channels: [i8; 16] },
    /// One 8-channel reading plus the latched classifier-armed flag.
    ///
    /// `classifier_armed` starts false for a fresh session and becomes
    /// permanently true the first time the trigger input reads active at
    /// decode time.
    Rectified {
        channels: [u16; 8],
        classifier_armed: bool,
    },
}

/// Events delivered on the receiver returned by
/// [`crate::myo_client::MyoClient::establish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MyoEvent {
    /// The link is up and every telemetry attribute is subscribed.
    /// The inner `String` is the transport's label for the peer.
    Connected(String),
    /// A decoded EMG notification.
    Emg(EmgSample),
    /// The BLE link was lost. The channel closes after this event;
    /// subscriptions die with the connection and need no explicit teardown.
    Disconnected,
}

/// Why a discovery or establishment attempt failed.
///
/// None of these are fatal: the supervisor retries the whole attempt, since
/// the dominant cause is a transient negotiation race rather than a
/// persistent fault. A persistently missing attribute is a configuration
/// defect that surfaces through the retry log.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The connection could not be opened, or a transport call failed
    /// mid-sequence.
    #[error("transport failure: {0}")]
    TransportFailure(#[source] TransportError),

    /// A required GATT service is absent from the peer's attribute table.
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),

    /// A required characteristic is absent from its service.
    #[error("characteristic not found: {0}")]
    CharacteristicNotFound(String),

    /// Enabling notifications on a telemetry attribute failed.
    #[error("subscription failed: {0}")]
    SubscriptionFailed(#[source] TransportError),

    /// The configured scan-attempt cap elapsed without a matching
    /// advertisement. Only possible when a cap is configured; discovery is
    /// unbounded by default.
    #[error("gave up scanning after {0} window(s) with no matching advertisement")]
    ScanExhausted(u32),
}
