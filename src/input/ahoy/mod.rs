//! AhoyDTU input source.
//!
//! Discovers the inverters configured on an AhoyDTU and keeps one snapshot
//! per inverter up to date by polling the DTU's REST API.

mod api;
mod client;
mod inverter;

pub use api::{FieldLayout, InverterList, InverterListEntry, InverterRecord, apply_record};
pub use client::DtuClient;
pub use inverter::{AhoyCommand, AhoyInverter, FailureCounter, PollSettings, Poller};

use crate::config::DtuConfig;
use crate::device::{DcChannel, DeviceDiscovery, Inverter, Snapshot};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Local;
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Device discovery and polling against an AhoyDTU.
pub struct AhoyDtu {
    settings: PollSettings,
    request_timeout: Duration,
    cancel: CancellationToken,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl AhoyDtu {
    /// Pollers spawned by [`DeviceDiscovery::connect`] stop when `cancel` fires.
    pub fn new(config: &DtuConfig, cancel: CancellationToken) -> Self {
        Self {
            settings: PollSettings {
                interval: Duration::from_secs(config.poll_interval_secs.max(1)),
                max_failures: config.max_failures.max(1),
            },
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            cancel,
            pollers: Mutex::new(Vec::new()),
        }
    }

    /// Wait for every poller to finish (after cancellation).
    pub async fn join(&self) {
        let pollers: Vec<_> = self.pollers.lock().drain(..).collect();
        futures_util::future::join_all(pollers).await;
    }

    /// First snapshot of an inverter: one immediate poll, or an empty
    /// snapshot with the listed channel count if that fails.
    async fn initial_snapshot(
        &self,
        client: &DtuClient,
        entry: &InverterListEntry,
        layout: &FieldLayout,
    ) -> Snapshot {
        let mut snapshot = Snapshot::new(&entry.name, &entry.serial);
        snapshot.dc = vec![DcChannel::default(); entry.channels];
        match client.inverter(entry.id).await {
            Ok(record) => apply_record(
                &mut snapshot,
                &record,
                layout,
                Local::now(),
                self.settings.stale_after_secs(),
            ),
            Err(e) => warn!(
                "[DTU] Initial poll of inverter {} ({}) failed: {}",
                entry.id, entry.name, e
            ),
        }
        snapshot
    }
}

#[async_trait]
impl DeviceDiscovery for AhoyDtu {
    async fn connect(&self, target: &str) -> Result<Vec<Arc<dyn Inverter>>> {
        let client = DtuClient::new(target, self.request_timeout)?;
        info!("[DTU] Connecting to {}", client.base_url());

        let list = client.inverter_list().await?;
        let layout = client.field_layout().await.unwrap_or_else(|e| {
            warn!("[DTU] Field layout unavailable, using defaults: {}", e);
            FieldLayout::default()
        });

        let mut inverters: Vec<Arc<dyn Inverter>> = Vec::new();
        for entry in list.inverter.iter().filter(|e| e.enabled) {
            let snapshot = self.initial_snapshot(&client, entry, &layout).await;
            info!(
                "[DTU] Found inverter {} ({}) serial {} with {} DC input(s)",
                entry.id,
                snapshot.name,
                snapshot.serial,
                snapshot.dc.len()
            );

            let (inverter, commands) = AhoyInverter::new(entry.id, snapshot);
            let poller = Poller::new(
                client.clone(),
                inverter.clone(),
                commands,
                layout.clone(),
                self.settings.clone(),
            );
            let handle = tokio::spawn(poller.run(self.cancel.child_token()));
            self.pollers.lock().push(handle);
            inverters.push(inverter);
        }

        Ok(inverters)
    }
}
