//! Device-polling collaborators.
//!
//! Each input source implements [`crate::device::DeviceDiscovery`] and
//! yields [`crate::device::Inverter`]s whose snapshots it keeps current.
//!
//! Current input sources:
//! - `ahoy`: AhoyDTU REST API
//! - `simulation`: simulated inverters for development

pub mod ahoy;
pub mod simulation;

pub use ahoy::AhoyDtu;
pub use simulation::SimulatedDtu;
