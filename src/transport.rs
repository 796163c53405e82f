//! Transport seams between the session logic and the BLE stack.
//!
//! The session in [`crate::myo_client`] is written against these traits
//! rather than against btleplug directly, so the whole establishment
//! sequence can be exercised with an in-memory transport. The production
//! implementation lives in [`crate::ble`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// An error from the underlying radio stack.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// One remote characteristic as seen during attribute discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAttribute {
    /// UUID of the containing service.
    pub service: Uuid,
    /// Characteristic UUID, when the platform resolves one. Vendor
    /// attributes that only resolve by handle carry `None` here.
    pub uuid: Option<Uuid>,
    /// ATT handle. Unique per attribute; the session's notification route
    /// table is keyed on it.
    pub handle: u16,
    /// Whether the characteristic supports notifications.
    pub can_notify: bool,
    /// UUIDs of the characteristic's descriptors.
    pub descriptors: Vec<Uuid>,
}

/// A raw notification payload, tagged with the handle of the attribute that
/// produced it. Format selection downstream is by this tag, never by
/// inspecting the payload.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub handle: u16,
    pub payload: Vec<u8>,
}

/// An advertisement observed during scanning: the peer's address plus its
/// declared service set.
#[derive(Debug, Clone)]
pub struct Advertisement<A> {
    pub address: A,
    pub services: Vec<Uuid>,
}

/// Start/stop control over an active scan.
#[async_trait]
pub trait ScanControl: Send + Sync {
    async fn start(&self) -> Result<(), TransportError>;
    async fn stop(&self) -> Result<(), TransportError>;
}

/// Connection-level attribute access for one peripheral.
///
/// One instance corresponds to one connection attempt; a retried
/// establishment constructs a fresh transport so no state leaks across
/// attempts.
#[async_trait]
pub trait BandTransport: Send + Sync + 'static {
    /// Short human-readable identifier for the peer (address or platform id).
    fn label(&self) -> String;

    /// Open the connection and populate the remote attribute table.
    async fn open(&self) -> Result<(), TransportError>;

    /// Enumerate every characteristic of every service. Pure read; safe to
    /// call at any time after [`open`](Self::open).
    async fn discover_attributes(&self) -> Result<Vec<RemoteAttribute>, TransportError>;

    /// Write a command payload to `attr` with response.
    async fn write_command(
        &self,
        attr: &RemoteAttribute,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Write [`crate::protocol::NOTIFY_ENABLE`] to the attribute's client
    /// configuration descriptor so the peer starts pushing notifications.
    async fn enable_notifications(&self, attr: &RemoteAttribute) -> Result<(), TransportError>;

    /// Take the notification stream for this connection.
    ///
    /// The transport pushes every notification into the returned channel,
    /// preserving per-attribute delivery order. The channel closes when the
    /// link drops.
    async fn notifications(&self) -> Result<mpsc::Receiver<RawNotification>, TransportError>;

    /// Whether the link is still up at the adapter level.
    async fn is_connected(&self) -> bool;

    /// Drop the connection. Subscriptions are torn down implicitly.
    async fn close(&self) -> Result<(), TransportError>;
}

// ── Trigger input ─────────────────────────────────────────────────────────────

/// An edge-triggered digital input sampled at decode time.
///
/// Reads are lock-free and may race harmlessly with whatever sets the line;
/// a stale level for one decode cycle is fine because the consumer only
/// latches the first active read.
pub trait TriggerInput: Send + Sync {
    fn is_active(&self) -> bool;
}

/// A momentary software trigger backed by an atomic flag.
///
/// Stands in for the physical arming line: [`press`](Self::press) drives the
/// input active, [`release`](Self::release) returns it to idle.
#[derive(Debug, Clone, Default)]
pub struct ManualTrigger {
    active: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.active.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn release(&self) {
        self.active.store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

impl TriggerInput for ManualTrigger {
    fn is_active(&self) -> bool {
        self.active.load(std::sync::atomic::Ordering::Relaxed)
    }
}
