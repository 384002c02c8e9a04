//! Published inverter things.
//!
//! This module contains the core of the bridge:
//! - `value`: typed property values and metadata
//! - `fields`: the declarative table of published properties
//! - `registry`: per-device property registry
//! - `bridge`: change-signal hand-off, diff-and-apply, write forwarding
//! - `consumer`: the serialized consumer context owning all registries
//! - `composer`: discovery and wiring of one thing per inverter

pub mod bridge;
pub mod composer;
pub mod consumer;
pub mod fields;
pub mod registry;
pub mod value;

pub use bridge::UpdateBridge;
pub use composer::{Thing, build_thing, discover_and_build};
pub use consumer::{ConsumerHandle, ConsumerLoop, ConsumerTask, consumer_channel};
pub use fields::{FieldSpec, LAST_UPDATE, POWER_LIMIT, inverter_fields};
pub use registry::{PropertyRegistry, RegistryEntry, WriteForwarder};
pub use value::{AccessMode, PropertyDescriptor, PropertyMetadata, PropertyType, PropertyValue};
