//! Per-device property registry.
//!
//! Holds the externally observable value of every published property of one
//! inverter. A registry is owned by the consumer loop; every mutating
//! operation takes `&mut self`, so mutation is confined to the consumer
//! context by construction and needs no lock.

use super::value::{AccessMode, PropertyDescriptor, PropertyMetadata, PropertyType, PropertyValue};
use crate::error::{BridgeError, Result};
use crate::publish::{PropertyPublisher, ThingDescription};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback receiving client writes for one read-write property.
pub type WriteForwarder = Arc<dyn Fn(PropertyValue) + Send + Sync>;

/// One published property and its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub descriptor: PropertyDescriptor,
    pub value: PropertyValue,
}

pub struct PropertyRegistry {
    thing: ThingDescription,
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
    forwarders: HashMap<String, WriteForwarder>,
    publisher: Arc<dyn PropertyPublisher>,
}

impl PropertyRegistry {
    pub fn new(thing: ThingDescription, publisher: Arc<dyn PropertyPublisher>) -> Self {
        Self {
            thing,
            entries: Vec::new(),
            index: HashMap::new(),
            forwarders: HashMap::new(),
            publisher,
        }
    }

    pub fn thing(&self) -> &ThingDescription {
        &self.thing
    }

    /// Add a property and announce it to the protocol layer.
    pub fn register(
        &mut self,
        name: &str,
        kind: PropertyType,
        mode: AccessMode,
        metadata: PropertyMetadata,
        initial: PropertyValue,
    ) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(BridgeError::DuplicateField(name.to_string()));
        }

        let entry = RegistryEntry {
            descriptor: PropertyDescriptor {
                name: name.to_string(),
                kind,
                mode,
                metadata,
            },
            value: initial,
        };
        self.publisher
            .register_property(&self.thing, &entry.descriptor, &entry.value);

        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Overwrite a property's value and push it to subscribed clients.
    pub fn apply(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        let position = *self
            .index
            .get(name)
            .ok_or_else(|| BridgeError::NotRegistered(name.to_string()))?;

        self.publisher
            .push_external_update(&self.thing, name, &value);
        self.entries[position].value = value;
        Ok(())
    }

    /// Register the forwarder invoked when a client writes `name`.
    pub fn on_write(&mut self, name: &str, forwarder: WriteForwarder) -> Result<()> {
        let entry = self.entry(name)?;
        if entry.descriptor.mode.is_read_only() {
            return Err(BridgeError::ReadOnlyField(name.to_string()));
        }
        self.forwarders.insert(name.to_string(), forwarder);
        Ok(())
    }

    /// Handle a client write.
    ///
    /// Forwards the (type-coerced) value and returns. The registry value is
    /// left untouched; it changes once the device reports the new value.
    pub fn write_requested(&self, name: &str, value: PropertyValue) -> Result<()> {
        let entry = self.entry(name)?;
        if entry.descriptor.mode.is_read_only() {
            return Err(BridgeError::ReadOnlyField(name.to_string()));
        }

        let kind = entry.descriptor.kind;
        let value = kind.coerce(value).ok_or_else(|| BridgeError::InvalidValue {
            field: name.to_string(),
            expected: kind.to_string(),
        })?;

        let forwarder = self
            .forwarders
            .get(name)
            .ok_or_else(|| BridgeError::UnsupportedCommand(name.to_string()))?;

        debug!("[Registry] {} write {} = {}", self.thing.title, name, value);
        forwarder(value);
        Ok(())
    }

    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.index.get(name).map(|&i| &self.entries[i].value)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&RegistryEntry> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| BridgeError::NotRegistered(name.to_string()))
    }
}
