//! In-memory collaborator used by unit tests.

use super::{ChangeListener, DeviceDiscovery, Inverter, Snapshot, SnapshotCell};
use crate::error::{BridgeError, Result};
use crate::thing::PropertyValue;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct FakeInverter {
    pub(crate) cell: SnapshotCell,
    commands: Mutex<Vec<(String, PropertyValue)>>,
    reject: AtomicBool,
}

impl FakeInverter {
    pub(crate) fn new(name: &str, serial: &str) -> Self {
        Self {
            cell: SnapshotCell::new(Snapshot::new(name, serial)),
            commands: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
        }
    }

    pub(crate) fn commands(&self) -> Vec<(String, PropertyValue)> {
        self.commands.lock().clone()
    }

    pub(crate) fn reject_commands(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }
}

impl Inverter for FakeInverter {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.cell.load()
    }

    fn set_command(&self, field: &str, value: &PropertyValue) -> Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(BridgeError::UnsupportedCommand(field.to_string()));
        }
        self.commands
            .lock()
            .push((field.to_string(), value.clone()));
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.cell.subscribe(listener);
    }
}

pub(crate) struct FakeDiscovery {
    pub(crate) inverters: Vec<Arc<FakeInverter>>,
}

#[async_trait]
impl DeviceDiscovery for FakeDiscovery {
    async fn connect(&self, _target: &str) -> Result<Vec<Arc<dyn Inverter>>> {
        Ok(self
            .inverters
            .iter()
            .map(|i| i.clone() as Arc<dyn Inverter>)
            .collect())
    }
}
