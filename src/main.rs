use std::io::{self, BufRead, Write as _};
use std::sync::Arc;

use anyhow::Result;
use btleplug::api::Central as _;
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};

use myo_rs::ble::{advertisements, first_adapter, AdapterScan, BtleTransport};
use myo_rs::myo_client::{MyoClient, MyoClientConfig};
use myo_rs::record;
use myo_rs::transport::{ManualTrigger, TriggerInput};
use myo_rs::types::{ConnectError, EmgMode, MyoEvent};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Per-channel signed 8-bit stream (four characteristics).
    Filtered,
    /// Rectified unsigned 16-bit stream (single vendor attribute).
    Rectified,
}

impl From<ModeArg> for EmgMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Filtered => EmgMode::Filtered,
            ModeArg::Rectified => EmgMode::Rectified,
        }
    }
}

/// Stream EMG feature vectors from a Myo band to stdout.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Streaming format to request from the band.
    #[arg(long, value_enum, default_value_t = ModeArg::Filtered)]
    mode: ModeArg,

    /// Seconds per scan window before the scan restarts.
    #[arg(long, default_value_t = 30)]
    scan_window: u64,

    /// Give up discovery after this many scan windows (default: scan forever).
    #[arg(long)]
    max_scan_windows: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=myo_rs=debug cargo run
    // Sample records go to stdout; all logging stays on stderr so the
    // classifier reading the pipe only ever sees _DATA_: lines.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = MyoClient::new(MyoClientConfig {
        mode: args.mode.into(),
        scan_window_secs: args.scan_window,
        scan_attempt_cap: args.max_scan_windows,
    });

    // The arming line is a physical input on the deployed hardware; on a
    // host it is driven from stdin. Lines are read on a dedicated OS thread
    // so a non-Send StdinLock is never held across an await point.
    let trigger = ManualTrigger::new();
    {
        let trigger = trigger.clone();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "a" | "arm" => {
                        info!("trigger pressed: classifier armed");
                        trigger.press();
                    }
                    "r" | "release" => {
                        trigger.release();
                    }
                    "" => {}
                    other => warn!("unknown command '{other}' (use 'a' to arm)"),
                }
            }
        });
    }
    let trigger: Arc<dyn TriggerInput> = Arc::new(trigger);

    let mut adapter = first_adapter().await?;

    loop {
        // ── Discovery ────────────────────────────────────────────────────────
        let scan = AdapterScan::new(adapter.clone());
        let mut adverts = advertisements(&adapter).await?;
        info!("scanning for a band advertising the control service …");
        let address = match client.discover(&scan, &mut adverts).await {
            Ok(address) => address,
            Err(err @ ConnectError::ScanExhausted(_)) => return Err(err.into()),
            Err(err) => {
                // A failed scan usually means the adapter went away (stream
                // closed, stack restart); re-acquire it and start over.
                warn!("discovery failed: {err}; re-acquiring adapter");
                adapter = first_adapter().await?;
                continue;
            }
        };
        info!("found band at {address:?}");
        let peripheral = adapter.peripheral(&address).await?;

        // ── Establishment with retry ─────────────────────────────────────────
        // The dominant failure mode is a transient negotiation race, so each
        // failed attempt is retried immediately on a fresh connection; the
        // settle delays inside the sequence are the only pacing needed.
        let (mut rx, handle) = loop {
            let transport = BtleTransport::new(adapter.clone(), peripheral.clone());
            match client.establish(transport, Arc::clone(&trigger)).await {
                Ok(session) => break session,
                Err(err) => warn!("session establishment failed: {err}; retrying"),
            }
        };

        match handle.describe_attributes().await {
            Ok(table) => debug!("attribute table:\n{table}"),
            Err(err) => warn!("could not enumerate attributes: {err}"),
        }

        // ── Streaming ────────────────────────────────────────────────────────
        // Nothing left to drive: notifications arrive asynchronously and the
        // dispatch task feeds this channel until the link drops.
        while let Some(event) = rx.recv().await {
            match event {
                MyoEvent::Connected(label) => info!("streaming from {label}"),
                MyoEvent::Emg(sample) => {
                    let mut out = io::stdout().lock();
                    record::write_sample(&mut out, &sample)?;
                    out.flush()?;
                }
                MyoEvent::Disconnected => break,
            }
        }
        info!("link lost; returning to discovery");
    }
}
