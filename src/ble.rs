//! btleplug-backed implementations of the transport seams.
//!
//! Everything platform-quirky lives here: adapter acquisition, connect and
//! discovery timeouts, the BlueZ GATT-cache pause, and the mapping from
//! btleplug's UUID-keyed world onto the handle-keyed attribute model the
//! session works with.

use std::collections::HashMap;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use log::{info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::protocol::{RECTIFIED_DATA_HANDLE, VENDOR_DATA_SERVICE};
use crate::transport::{
    Advertisement, BandTransport, RawNotification, RemoteAttribute, ScanControl, TransportError,
};

impl From<btleplug::Error> for TransportError {
    fn from(err: btleplug::Error) -> Self {
        TransportError(err.to_string())
    }
}

// ── Adapter ───────────────────────────────────────────────────────────────────

/// Acquire the first Bluetooth adapter on the system.
pub async fn first_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError("no Bluetooth adapter found".into()))?;

    // macOS: CBCentralManager starts in an "unknown" state after launch and
    // silently ignores scan requests until it reaches poweredOn.
    #[cfg(target_os = "macos")]
    {
        use btleplug::api::CentralState;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => break,
                Ok(_) if tokio::time::Instant::now() >= deadline => break,
                Ok(_) => {}
                Err(_) => break,
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    Ok(adapter)
}

// ── Scanning ──────────────────────────────────────────────────────────────────

/// [`ScanControl`] over a btleplug adapter.
///
/// The scan itself is unfiltered; matching against the control service is
/// done by the discovery loop on the advertised service sets.
pub struct AdapterScan {
    adapter: Adapter,
}

impl AdapterScan {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl ScanControl for AdapterScan {
    async fn start(&self) -> Result<(), TransportError> {
        Ok(self.adapter.start_scan(ScanFilter::default()).await?)
    }

    async fn stop(&self) -> Result<(), TransportError> {
        Ok(self.adapter.stop_scan().await?)
    }
}

/// The adapter's advertisement stream, reduced to address + declared
/// service set. Central events that carry no service list are dropped here,
/// which is also where malformed advertisements fall out.
pub async fn advertisements(
    adapter: &Adapter,
) -> Result<impl Stream<Item = Advertisement<PeripheralId>> + Unpin, TransportError> {
    let events = adapter.events().await?;
    Ok(Box::pin(events.filter_map(|event| async move {
        match event {
            CentralEvent::ServicesAdvertisement { id, services } => Some(Advertisement {
                address: id,
                services,
            }),
            _ => None,
        }
    })))
}

// ── Handle mapping ────────────────────────────────────────────────────────────

/// Assign ATT handles to the discovered characteristics.
///
/// The band's GATT table is fixed in firmware, but btleplug does not surface
/// raw ATT handles on any platform. The vendor data attribute is the only
/// one the session addresses by handle, so the first notify-capable
/// characteristic of the vendor service is pinned to its firmware handle;
/// everything else gets a synthetic ordinal outside the band's real handle
/// range. Pinning only the first keeps the assignment collision-free even
/// against a firmware that exposes more vendor attributes.
fn assign_handles(characteristics: &[Characteristic]) -> Vec<u16> {
    let mut vendor_pinned = false;
    let handles: Vec<u16> = characteristics
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if !vendor_pinned
                && c.service_uuid == VENDOR_DATA_SERVICE
                && c.properties.contains(CharPropFlags::NOTIFY)
            {
                vendor_pinned = true;
                RECTIFIED_DATA_HANDLE
            } else {
                0x0100 + i as u16
            }
        })
        .collect();
    debug_assert_eq!(
        handles.iter().collect::<std::collections::HashSet<_>>().len(),
        handles.len(),
        "assigned handles must be unique"
    );
    handles
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// One connection attempt to one peripheral.
///
/// Construct a fresh value per [`crate::myo_client::MyoClient::establish`]
/// call; dropping it (or calling `close`) releases the link and every
/// subscription with it.
pub struct BtleTransport {
    adapter: Adapter,
    peripheral: Peripheral,
}

impl BtleTransport {
    pub fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        Self {
            adapter,
            peripheral,
        }
    }

    fn attribute_table(&self) -> Vec<(Characteristic, u16)> {
        let characteristics: Vec<Characteristic> =
            self.peripheral.characteristics().into_iter().collect();
        let handles = assign_handles(&characteristics);
        characteristics.into_iter().zip(handles).collect()
    }

    fn characteristic_for(&self, handle: u16) -> Result<Characteristic, TransportError> {
        self.attribute_table()
            .into_iter()
            .find(|(_, h)| *h == handle)
            .map(|(c, _)| c)
            .ok_or_else(|| TransportError(format!("no characteristic for handle 0x{handle:02x}")))
    }
}

#[async_trait]
impl BandTransport for BtleTransport {
    fn label(&self) -> String {
        self.peripheral.id().to_string()
    }

    async fn open(&self) -> Result<(), TransportError> {
        // BlueZ's Connect call can block forever when the peer has gone out
        // of range; ten seconds is generous for a link that normally takes
        // under two.
        timeout(Duration::from_secs(10), self.peripheral.connect())
            .await
            .map_err(|_| TransportError("connect timed out after 10 s".into()))??;

        // On Linux the stack reports the link up before the remote GATT
        // cache is populated; discovering too early yields an empty table.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        timeout(Duration::from_secs(15), self.peripheral.discover_services())
            .await
            .map_err(|_| TransportError("service discovery timed out after 15 s".into()))??;
        Ok(())
    }

    async fn discover_attributes(&self) -> Result<Vec<RemoteAttribute>, TransportError> {
        Ok(self
            .attribute_table()
            .into_iter()
            .map(|(c, handle)| RemoteAttribute {
                service: c.service_uuid,
                uuid: Some(c.uuid),
                handle,
                can_notify: c.properties.contains(CharPropFlags::NOTIFY),
                descriptors: c.descriptors.iter().map(|d| d.uuid).collect(),
            })
            .collect())
    }

    async fn write_command(
        &self,
        attr: &RemoteAttribute,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic_for(attr.handle)?;
        Ok(self
            .peripheral
            .write(&characteristic, payload, WriteType::WithResponse)
            .await?)
    }

    async fn enable_notifications(&self, attr: &RemoteAttribute) -> Result<(), TransportError> {
        let characteristic = self.characteristic_for(attr.handle)?;
        // subscribe() writes NOTIFY_ENABLE to the 0x2902 descriptor through
        // the platform stack.
        Ok(self.peripheral.subscribe(&characteristic).await?)
    }

    async fn notifications(&self) -> Result<mpsc::Receiver<RawNotification>, TransportError> {
        let mut stream = self.peripheral.notifications().await?;
        let mut events = self.adapter.events().await?;
        let peripheral_id = self.peripheral.id();

        // Snapshot of uuid → handle for routing; the table cannot change
        // while the connection is up.
        let routes: HashMap<_, _> = self
            .attribute_table()
            .into_iter()
            .map(|(c, handle)| (c.uuid, handle))
            .collect();

        let (tx, rx) = mpsc::channel::<RawNotification>(256);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = stream.next() => match notification {
                        Some(n) => {
                            let Some(&handle) = routes.get(&n.uuid) else {
                                warn!("notification from unknown characteristic {}", n.uuid);
                                continue;
                            };
                            if tx
                                .send(RawNotification { handle, payload: n.value })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        None => break,
                    },
                    event = events.next() => match event {
                        // The disconnect event usually fires before the
                        // notification stream closes; ending the pump here
                        // lets the session observe the drop sooner.
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            info!("link to {peripheral_id:?} dropped");
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        });
        Ok(rx)
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(self.peripheral.disconnect().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EMG_DATA_SERVICE;
    use uuid::Uuid;

    fn characteristic(service: Uuid, uuid: Uuid, notify: bool) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid: service,
            properties: if notify {
                CharPropFlags::NOTIFY
            } else {
                CharPropFlags::READ
            },
            descriptors: Default::default(),
        }
    }

    #[test]
    fn only_the_first_vendor_notify_characteristic_gets_the_firmware_handle() {
        let characteristics = vec![
            characteristic(EMG_DATA_SERVICE, Uuid::from_u128(1), true),
            characteristic(VENDOR_DATA_SERVICE, Uuid::from_u128(2), false),
            characteristic(VENDOR_DATA_SERVICE, Uuid::from_u128(3), true),
            characteristic(VENDOR_DATA_SERVICE, Uuid::from_u128(4), true),
        ];

        let handles = assign_handles(&characteristics);
        assert_eq!(handles[2], RECTIFIED_DATA_HANDLE);
        assert_eq!(
            handles
                .iter()
                .filter(|&&h| h == RECTIFIED_DATA_HANDLE)
                .count(),
            1
        );

        let unique: std::collections::HashSet<_> = handles.iter().collect();
        assert_eq!(unique.len(), handles.len());
    }

    #[test]
    fn ordinals_stay_clear_of_the_firmware_handle_range() {
        let characteristics = vec![
            characteristic(EMG_DATA_SERVICE, Uuid::from_u128(1), true),
            characteristic(EMG_DATA_SERVICE, Uuid::from_u128(2), true),
        ];
        for handle in assign_handles(&characteristics) {
            assert!(handle >= 0x0100);
        }
    }
}
