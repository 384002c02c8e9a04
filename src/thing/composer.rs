//! Device set composer.
//!
//! Enumerates the inverters behind a connection target and builds one
//! registry + bridge pair ([`Thing`]) per inverter.

use super::bridge::UpdateBridge;
use super::consumer::ConsumerHandle;
use super::fields::inverter_fields;
use super::registry::PropertyRegistry;
use crate::device::{DeviceDiscovery, Inverter};
use crate::error::{BridgeError, Result};
use crate::publish::{PropertyPublisher, ThingDescription};
use log::info;
use std::sync::Arc;

/// Capability advertised for every inverter thing.
pub const INVERTER_CAPABILITY: &str = "MultiLevelSensor";

/// One published inverter: its registry and the bridge feeding it.
pub struct Thing {
    pub registry: PropertyRegistry,
    pub bridge: Arc<UpdateBridge>,
}

/// Discover inverters and build a thing for each.
///
/// Fails with [`BridgeError::NoDevicesFound`] before publishing anything when
/// the target reports no inverters.
pub async fn discover_and_build(
    discovery: &dyn DeviceDiscovery,
    connection_target: &str,
    description: &str,
    publisher: Arc<dyn PropertyPublisher>,
    consumer: &ConsumerHandle,
) -> Result<Vec<Thing>> {
    let inverters = discovery.connect(connection_target).await?;
    if inverters.is_empty() {
        return Err(BridgeError::NoDevicesFound(connection_target.to_string()));
    }

    let mut things = Vec::with_capacity(inverters.len());
    for (key, inverter) in inverters.into_iter().enumerate() {
        things.push(build_thing(
            key,
            inverter,
            description,
            publisher.clone(),
            consumer,
        )?);
    }
    Ok(things)
}

/// Build the thing for one inverter; `key` is its position in the thing list.
pub fn build_thing(
    key: usize,
    inverter: Arc<dyn Inverter>,
    description: &str,
    publisher: Arc<dyn PropertyPublisher>,
    consumer: &ConsumerHandle,
) -> Result<Thing> {
    let identity = inverter.identity();
    let fields = inverter_fields(inverter.snapshot().dc.len());
    let thing = ThingDescription {
        id: identity.thing_id(),
        slug: identity.slug(),
        title: identity.title(),
        description: description.to_string(),
        capabilities: vec![INVERTER_CAPABILITY.to_string()],
    };

    let mut registry = PropertyRegistry::new(thing, publisher);
    let bridge = UpdateBridge::new(key, inverter, fields, consumer.clone());
    // Subscribe before the first snapshot read so a swap in between queues a refresh.
    bridge.subscribe();
    bridge.attach(&mut registry)?;

    info!(
        "[Bridge] {} ({}) published with {} properties",
        registry.thing().title,
        registry.thing().id,
        registry.len()
    );
    Ok(Thing { registry, bridge })
}
