//! # myo-rs
//!
//! Async Rust client for streaming EMG data from a
//! [Myo gesture armband](https://en.wikipedia.org/wiki/Myo_armband) over
//! Bluetooth Low Energy.
//!
//! The crate covers the full device-session lifecycle: scanning until a band
//! advertises the control service, establishing the connection with retry,
//! sequencing the sleep-disable and mode-select commands (with the settle
//! delays the band requires), subscribing the telemetry attributes, and
//! decoding both EMG wire formats into typed samples for a downstream
//! classifier.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use myo_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let adapter = myo_rs::ble::first_adapter().await?;
//!     let client = MyoClient::new(MyoClientConfig::default());
//!
//!     let scan = myo_rs::ble::AdapterScan::new(adapter.clone());
//!     let mut adverts = myo_rs::ble::advertisements(&adapter).await?;
//!     let address = client.discover(&scan, &mut adverts).await?;
//!
//!     let peripheral = adapter.peripheral(&address).await?;
//!     let transport = myo_rs::ble::BtleTransport::new(adapter, peripheral);
//!     let trigger: Arc<dyn TriggerInput> = Arc::new(ManualTrigger::new());
//!     let (mut rx, _handle) = client.establish(transport, trigger).await?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             MyoEvent::Emg(sample) => println!("{sample:?}"),
//!             MyoEvent::Disconnected => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`myo_client`] | Discovery loop, session establishment, notification dispatch |
//! | [`transport`] | Trait seams over the BLE stack and the trigger input |
//! | [`ble`] | btleplug-backed transport implementation |
//! | [`protocol`] | Vendor UUIDs, command frames, and timing constants |
//! | [`decode`] | Payload decoders for the two EMG wire formats |
//! | [`record`] | The `_DATA_:` line format written for the classifier |
//! | [`types`] | Samples, events, and the error taxonomy |

pub mod ble;
pub mod decode;
pub mod myo_client;
pub mod protocol;
pub mod record;
pub mod transport;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::myo_client::{MyoClient, MyoClientConfig, MyoHandle};
    pub use crate::transport::{
        Advertisement, BandTransport, ManualTrigger, RawNotification, RemoteAttribute,
        ScanControl, TriggerInput,
    };
    pub use crate::types::{ConnectError, EmgMode, EmgSample, MyoEvent};

    pub use btleplug::api::{Central as _, Peripheral as _};
}
