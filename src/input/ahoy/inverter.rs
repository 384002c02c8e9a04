//! AhoyDTU-backed inverter and its polling task.

use super::api::{FieldLayout, apply_record};
use super::client::DtuClient;
use crate::device::{ChangeListener, Inverter, Snapshot, SnapshotCell};
use crate::error::{BridgeError, Result};
use crate::thing::{POWER_LIMIT, PropertyValue};
use chrono::Local;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Commands queued for the polling task.
#[derive(Debug, Clone, PartialEq)]
pub enum AhoyCommand {
    /// Absolute power limit in watts
    PowerLimit(i64),
}

/// One inverter managed by an AhoyDTU.
pub struct AhoyInverter {
    /// Inverter id on the DTU
    id: u32,
    cell: SnapshotCell,
    commands: mpsc::UnboundedSender<AhoyCommand>,
}

impl AhoyInverter {
    pub fn new(id: u32, initial: Snapshot) -> (Arc<Self>, mpsc::UnboundedReceiver<AhoyCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let inverter = Arc::new(Self {
            id,
            cell: SnapshotCell::new(initial),
            commands,
        });
        (inverter, rx)
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Inverter for AhoyInverter {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.cell.load()
    }

    fn set_command(&self, field: &str, value: &PropertyValue) -> Result<()> {
        let command = match field {
            POWER_LIMIT => {
                let watts = value.as_i64().ok_or_else(|| BridgeError::InvalidValue {
                    field: field.to_string(),
                    expected: "integer".to_string(),
                })?;
                AhoyCommand::PowerLimit(watts)
            }
            _ => return Err(BridgeError::UnsupportedCommand(field.to_string())),
        };
        self.commands
            .send(command)
            .map_err(|_| BridgeError::UnsupportedCommand(format!("{} (poller stopped)", field)))
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.cell.subscribe(listener);
    }
}

/// Polling settings shared by all inverters of one DTU.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// Consecutive failed polls before the inverter is reported unavailable
    pub max_failures: u32,
}

impl PollSettings {
    /// Age of the last radio exchange after which the inverter counts as gone.
    pub fn stale_after_secs(&self) -> i64 {
        (self.interval.as_secs() as i64 * 3).max(30)
    }
}

/// Consecutive failed polls of one inverter.
#[derive(Debug)]
pub struct FailureCounter {
    failures: u32,
    max_failures: u32,
}

impl FailureCounter {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: 0,
            max_failures: max_failures.max(1),
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Count a failed poll. Marks the snapshot unavailable exactly when the
    /// count reaches the threshold and returns whether it did.
    pub fn record_failure(&mut self, cell: &SnapshotCell) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.failures != self.max_failures {
            return false;
        }
        cell.update(|s| {
            s.is_available = false;
            s.is_producing = false;
        });
        true
    }

    /// Reset after a successful poll, returning the failures it ends.
    pub fn record_success(&mut self) -> u32 {
        std::mem::take(&mut self.failures)
    }
}

/// Periodically refreshes one inverter's snapshot and executes its commands.
pub struct Poller {
    client: DtuClient,
    inverter: Arc<AhoyInverter>,
    commands: mpsc::UnboundedReceiver<AhoyCommand>,
    layout: FieldLayout,
    settings: PollSettings,
    failures: FailureCounter,
}

impl Poller {
    pub fn new(
        client: DtuClient,
        inverter: Arc<AhoyInverter>,
        commands: mpsc::UnboundedReceiver<AhoyCommand>,
        layout: FieldLayout,
        settings: PollSettings,
    ) -> Self {
        Self {
            client,
            inverter,
            commands,
            failures: FailureCounter::new(settings.max_failures),
            layout,
            settings,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "[DTU] Polling inverter {} every {:?}",
            self.inverter.id(),
            self.settings.interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
                Some(command) = self.commands.recv() => self.execute(command).await,
            }
        }
        debug!("[DTU] Poller for inverter {} stopped", self.inverter.id());
    }

    async fn poll_once(&mut self) {
        match self.client.inverter(self.inverter.id()).await {
            Ok(record) => {
                let failures = self.failures.record_success();
                if failures > 0 {
                    info!(
                        "[DTU] Inverter {} reachable again after {} failed poll(s)",
                        self.inverter.id(),
                        failures
                    );
                }
                let now = Local::now();
                let stale_after = self.settings.stale_after_secs();
                self.inverter
                    .cell
                    .update(|s| apply_record(s, &record, &self.layout, now, stale_after));
            }
            Err(e) => {
                let marked = self.failures.record_failure(&self.inverter.cell);
                warn!(
                    "[DTU] Poll of inverter {} failed ({}): {}",
                    self.inverter.id(),
                    self.failures.failures(),
                    e
                );
                if marked {
                    warn!("[DTU] Marked inverter {} unavailable", self.inverter.id());
                }
            }
        }
    }

    async fn execute(&self, command: AhoyCommand) {
        match command {
            AhoyCommand::PowerLimit(watts) => {
                match self.client.set_power_limit(self.inverter.id(), watts).await {
                    Ok(()) => info!(
                        "[DTU] Power limit {} W sent to inverter {}",
                        watts,
                        self.inverter.id()
                    ),
                    Err(e) => warn!(
                        "[DTU] Power limit {} W for inverter {} failed: {}",
                        watts,
                        self.inverter.id(),
                        e
                    ),
                }
            }
        }
    }
}
