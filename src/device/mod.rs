//! Interface of the device-polling collaborator.
//!
//! The bridge never talks to inverter hardware itself. It consumes devices
//! through [`Inverter`] (snapshot read, command, change subscription) and
//! enumerates them through [`DeviceDiscovery`]. Concrete collaborators live in
//! `crate::input`.

pub mod snapshot;
#[cfg(test)]
pub(crate) mod testing;

pub use snapshot::{ChangeListener, DcChannel, Snapshot, SnapshotCell};

use crate::error::Result;
use crate::thing::PropertyValue;
use async_trait::async_trait;
use std::sync::Arc;

/// One inverter as maintained by a polling collaborator.
///
/// Implementations must guarantee that [`Inverter::snapshot`] returns the
/// readings of a single polling cycle, even while a poll is in progress.
pub trait Inverter: Send + Sync + 'static {
    /// The latest snapshot. Never performs I/O.
    fn snapshot(&self) -> Arc<Snapshot>;

    /// Issue a fire-and-forget command, e.g. `("power_limit", 500)`.
    ///
    /// Returns once the command is queued. The device reflects it in a later
    /// snapshot, or never if it rejects it.
    fn set_command(&self, field: &str, value: &PropertyValue) -> Result<()>;

    /// Register a listener fired whenever the snapshot changes.
    fn subscribe(&self, listener: ChangeListener);

    fn identity(&self) -> DeviceIdentity {
        let snapshot = self.snapshot();
        DeviceIdentity::new(snapshot.name.clone(), snapshot.serial.clone())
    }
}

/// Enumerates the inverters reachable through a connection target.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    async fn connect(&self, target: &str) -> Result<Vec<Arc<dyn Inverter>>>;
}

/// Name and serial of an inverter, fixed once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub name: String,
    pub serial: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial: serial.into(),
        }
    }

    /// Externally visible thing identifier.
    pub fn thing_id(&self) -> String {
        format!("urn:dev:ops:inverter-{}", self.serial)
    }

    /// Topic-safe short form of the identifier.
    pub fn slug(&self) -> String {
        format!("inverter-{}", self.serial)
    }

    pub fn title(&self) -> String {
        format!("Inverter {}", self.name).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_naming() {
        let id = DeviceIdentity::new("Balcony", "114182912345");
        assert_eq!(id.thing_id(), "urn:dev:ops:inverter-114182912345");
        assert_eq!(id.slug(), "inverter-114182912345");
        assert_eq!(id.title(), "Inverter Balcony");
        assert_eq!(DeviceIdentity::new("", "1").title(), "Inverter");
    }
}
