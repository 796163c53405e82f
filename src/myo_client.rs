//! BLE session logic for the Myo band: discovery, establishment, and
//! notification dispatch.
//!
//! Everything here is written against the seams in [`crate::transport`], so
//! the full command sequence and dispatch path run identically over the
//! btleplug backend in [`crate::ble`] and over an in-memory transport in
//! tests.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::decode::{decode_filtered, decode_rectified, ArmedLatch, DecodeKind};
use crate::protocol::{
    set_emg_mode_command, COMMAND_CHARACTERISTIC, CONTROL_SERVICE, EMG_DATA_CHARACTERISTICS,
    EMG_DATA_SERVICE, NEVER_SLEEP_COMMAND, RECTIFIED_DATA_HANDLE, SETTLE_DELAY,
    VENDOR_DATA_SERVICE,
};
use crate::transport::{
    Advertisement, BandTransport, RemoteAttribute, ScanControl, TransportError, TriggerInput,
};
use crate::types::{ConnectError, EmgMode, EmgSample, MyoEvent};

// ── Config ────────────────────────────────────────────────────────────────────

/// Configuration for [`MyoClient`].
#[derive(Debug, Clone)]
pub struct MyoClientConfig {
    /// Streaming format to negotiate. Default: [`EmgMode::Filtered`].
    pub mode: EmgMode,
    /// Length of one scan window in seconds before the scan restarts.
    /// Default: `30`.
    pub scan_window_secs: u64,
    /// Stop discovery after this many scan windows. `None` scans forever,
    /// which is the correct default for an unattended deployment — there is
    /// nothing useful to do without a band.
    pub scan_attempt_cap: Option<u32>,
}

impl Default for MyoClientConfig {
    fn default() -> Self {
        Self {
            mode: EmgMode::Filtered,
            scan_window_secs: 30,
            scan_attempt_cap: None,
        }
    }
}

// ── MyoClient ─────────────────────────────────────────────────────────────────

/// Discovery and session establishment for one Myo band.
///
/// The client owns no connection state itself; each
/// [`establish`](MyoClient::establish) call consumes a fresh transport, so a
/// failed attempt cannot leak subscriptions into the next one.
pub struct MyoClient {
    config: MyoClientConfig,
}

impl MyoClient {
    pub fn new(config: MyoClientConfig) -> Self {
        Self { config }
    }

    pub fn mode(&self) -> EmgMode {
        self.config.mode
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Scan until an advertisement declaring the control service appears and
    /// return that peer's address.
    ///
    /// Runs the scan in bounded windows. The first match wins — the scan is
    /// stopped immediately so stale or duplicate advertisements cannot
    /// re-latch a different peer — and later advertisements are ignored.
    /// A window that elapses without a match restarts the scan; only a
    /// configured attempt cap bounds this. The advertisement stream closing
    /// is terminal — it means the adapter is gone — and surfaces as a
    /// transport failure so the caller can re-acquire the adapter.
    pub async fn discover<A, S, St>(&self, scan: &S, adverts: &mut St) -> Result<A, ConnectError>
    where
        S: ScanControl,
        St: Stream<Item = Advertisement<A>> + Unpin,
    {
        let mut windows = 0u32;
        loop {
            windows += 1;
            scan.start().await.map_err(ConnectError::TransportFailure)?;

            let window = tokio::time::sleep(std::time::Duration::from_secs(
                self.config.scan_window_secs,
            ));
            tokio::pin!(window);

            let mut matched = None;
            let mut stream_closed = false;
            loop {
                tokio::select! {
                    _ = &mut window => break,
                    advert = adverts.next() => match advert {
                        Some(advert) if advert.services.contains(&CONTROL_SERVICE) => {
                            matched = Some(advert.address);
                            break;
                        }
                        // Advertisements without the control service —
                        // including malformed ones the backend reduced to an
                        // empty service set — are skipped, never fatal.
                        Some(_) => {}
                        // The stream only closes when the adapter itself is
                        // gone. Restarting the window here would spin without
                        // ever yielding, so it is terminal for this scan.
                        None => {
                            stream_closed = true;
                            break;
                        }
                    },
                }
            }

            scan.stop().await.map_err(ConnectError::TransportFailure)?;

            if stream_closed {
                return Err(ConnectError::TransportFailure(TransportError(
                    "advertisement stream closed".into(),
                )));
            }

            if let Some(address) = matched {
                info!("discovery: matched band after {windows} scan window(s)");
                return Ok(address);
            }
            if let Some(cap) = self.config.scan_attempt_cap {
                if windows >= cap {
                    return Err(ConnectError::ScanExhausted(windows));
                }
            }
            debug!("discovery: window elapsed with no match, restarting scan");
        }
    }

    // ── Establishment ─────────────────────────────────────────────────────────

    /// Connect, negotiate the streaming mode, subscribe every telemetry
    /// attribute, and start the dispatch task.
    ///
    /// Returns the typed event receiver and a [`MyoHandle`] only once every
    /// subscription has succeeded. On any failure the link is closed before
    /// the error propagates, so the supervisor can retry with a fresh
    /// transport immediately — no backoff is needed beyond the settle delays
    /// already inside the sequence.
    pub async fn establish<T: BandTransport>(
        &self,
        transport: T,
        trigger: Arc<dyn TriggerInput>,
    ) -> Result<(mpsc::Receiver<MyoEvent>, MyoHandle<T>), ConnectError> {
        match self.negotiate(&transport, trigger).await {
            Ok(rx) => Ok((rx, MyoHandle { transport })),
            Err(err) => {
                // Half-configured links must not survive into the next
                // attempt; the close also tears down any subscriptions that
                // were already installed.
                let _ = transport.close().await;
                Err(err)
            }
        }
    }

    async fn negotiate<T: BandTransport>(
        &self,
        transport: &T,
        trigger: Arc<dyn TriggerInput>,
    ) -> Result<mpsc::Receiver<MyoEvent>, ConnectError> {
        transport
            .open()
            .await
            .map_err(ConnectError::TransportFailure)?;
        let label = transport.label();
        info!("{label}: connected, enumerating attributes");

        let attrs = transport
            .discover_attributes()
            .await
            .map_err(ConnectError::TransportFailure)?;

        if !attrs.iter().any(|a| a.service == CONTROL_SERVICE) {
            return Err(ConnectError::ServiceNotFound(CONTROL_SERVICE));
        }
        let command = attrs
            .iter()
            .find(|a| a.service == CONTROL_SERVICE && a.uuid == Some(COMMAND_CHARACTERISTIC))
            .ok_or_else(|| {
                ConnectError::CharacteristicNotFound(COMMAND_CHARACTERISTIC.to_string())
            })?;

        // The band silently drops back-to-back commands, so each write is
        // followed by the settle delay before the next attribute operation.
        transport
            .write_command(command, &NEVER_SLEEP_COMMAND)
            .await
            .map_err(ConnectError::TransportFailure)?;
        tokio::time::sleep(SETTLE_DELAY).await;

        transport
            .write_command(command, &set_emg_mode_command(self.config.mode))
            .await
            .map_err(ConnectError::TransportFailure)?;
        tokio::time::sleep(SETTLE_DELAY).await;

        let telemetry = self.resolve_telemetry(&attrs)?;

        // Take the notification stream before any CCCD write so the first
        // packets cannot slip past the dispatch task.
        let raw_rx = transport
            .notifications()
            .await
            .map_err(ConnectError::TransportFailure)?;

        for (attr, _) in &telemetry {
            transport
                .enable_notifications(attr)
                .await
                .map_err(ConnectError::SubscriptionFailed)?;
            debug!("{label}: subscribed handle 0x{:02x}", attr.handle);
        }

        let routes: HashMap<u16, DecodeKind> = telemetry
            .iter()
            .map(|(attr, kind)| (attr.handle, *kind))
            .collect();

        let (tx, rx) = mpsc::channel::<MyoEvent>(256);
        let _ = tx.send(MyoEvent::Connected(label)).await;
        spawn_dispatch(raw_rx, routes, trigger, tx);

        Ok(rx)
    }

    /// Resolve the attribute(s) that will carry telemetry in the configured
    /// mode, paired with the decoder their notifications route to.
    fn resolve_telemetry(
        &self,
        attrs: &[RemoteAttribute],
    ) -> Result<Vec<(RemoteAttribute, DecodeKind)>, ConnectError> {
        match self.config.mode {
            EmgMode::Filtered => {
                if !attrs.iter().any(|a| a.service == EMG_DATA_SERVICE) {
                    return Err(ConnectError::ServiceNotFound(EMG_DATA_SERVICE));
                }
                // All four per-channel characteristics are required; a
                // partial stream is useless to the classifier.
                EMG_DATA_CHARACTERISTICS
                    .iter()
                    .map(|&uuid| {
                        attrs
                            .iter()
                            .find(|a| a.service == EMG_DATA_SERVICE && a.uuid == Some(uuid))
                            .cloned()
                            .map(|a| (a, DecodeKind::Filtered))
                            .ok_or_else(|| {
                                ConnectError::CharacteristicNotFound(uuid.to_string())
                            })
                    })
                    .collect()
            }
            EmgMode::Rectified => {
                // The vendor attribute does not resolve by UUID on the
                // band's firmware; it is looked up in the handle table.
                let attr = attrs
                    .iter()
                    .find(|a| {
                        a.service == VENDOR_DATA_SERVICE && a.handle == RECTIFIED_DATA_HANDLE
                    })
                    .cloned()
                    .ok_or_else(|| {
                        ConnectError::CharacteristicNotFound(format!(
                            "vendor attribute at handle 0x{RECTIFIED_DATA_HANDLE:02x}"
                        ))
                    })?;
                Ok(vec![(attr, DecodeKind::Rectified)])
            }
        }
    }
}

/// Decode raw notifications and forward typed events until the link drops.
///
/// Runs outside the supervisor's call stack. Per-attribute ordering is
/// preserved by the raw channel; decode errors drop the one sample and keep
/// the session alive.
fn spawn_dispatch(
    mut raw_rx: mpsc::Receiver<crate::transport::RawNotification>,
    routes: HashMap<u16, DecodeKind>,
    trigger: Arc<dyn TriggerInput>,
    tx: mpsc::Sender<MyoEvent>,
) {
    tokio::spawn(async move {
        let mut latch = ArmedLatch::new();
        while let Some(raw) = raw_rx.recv().await {
            let Some(kind) = routes.get(&raw.handle) else {
                debug!("notification from unmapped handle 0x{:02x}", raw.handle);
                continue;
            };
            let decoded = match kind {
                DecodeKind::Filtered => {
                    decode_filtered(&raw.payload).map(|channels| EmgSample::Filtered { channels })
                }
                DecodeKind::Rectified => decode_rectified(&raw.payload).map(|channels| {
                    EmgSample::Rectified {
                        channels,
                        classifier_armed: latch.observe(trigger.is_active()),
                    }
                }),
            };
            match decoded {
                Ok(sample) => {
                    if tx.send(MyoEvent::Emg(sample)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        "dropping notification from handle 0x{:02x}: {err}",
                        raw.handle
                    );
                }
            }
        }
        let _ = tx.send(MyoEvent::Disconnected).await;
    });
}

// ── MyoHandle ─────────────────────────────────────────────────────────────────

/// A live session: the exclusive owner of the connection and its
/// subscriptions.
pub struct MyoHandle<T: BandTransport> {
    transport: T,
}

impl<T: BandTransport> std::fmt::Debug for MyoHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MyoHandle").finish_non_exhaustive()
    }
}

impl<T: BandTransport> MyoHandle<T> {
    /// Render the peer's full attribute table for operator diagnostics.
    ///
    /// Lists every service, its characteristics with their handles, and each
    /// characteristic's descriptors. Pure read; safe at any time while
    /// connected.
    pub async fn describe_attributes(&self) -> Result<String, ConnectError> {
        let mut attrs = self
            .transport
            .discover_attributes()
            .await
            .map_err(ConnectError::TransportFailure)?;
        attrs.sort_by_key(|a| (a.service, a.handle));

        let mut out = String::new();
        let mut current_service = None;
        for attr in &attrs {
            if current_service != Some(attr.service) {
                out.push_str(&format!("service {}\n", attr.service));
                current_service = Some(attr.service);
            }
            let uuid = attr
                .uuid
                .map(|u| u.to_string())
                .unwrap_or_else(|| "<no uuid>".into());
            out.push_str(&format!(
                "  0x{:02x} {uuid}{}\n",
                attr.handle,
                if attr.can_notify { " [notify]" } else { "" }
            ));
            for descriptor in &attr.descriptors {
                out.push_str(&format!("    descriptor {descriptor}\n"));
            }
        }
        Ok(out)
    }

    /// Whether the link is still up at the adapter level. Poll this to
    /// detect disconnects faster than waiting for the event channel to close.
    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Drop the connection. Subscriptions are torn down implicitly with the
    /// link; there is no explicit unsubscribe in normal shutdown.
    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        self.transport
            .close()
            .await
            .map_err(ConnectError::TransportFailure)
    }
}
