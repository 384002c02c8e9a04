//! Publisher that only logs. Used for dry runs without a broker.

use super::{PropertyPublisher, ThingDescription};
use crate::thing::{PropertyDescriptor, PropertyValue};
use log::{debug, info};

pub struct LogPublisher;

impl PropertyPublisher for LogPublisher {
    fn register_property(
        &self,
        thing: &ThingDescription,
        property: &PropertyDescriptor,
        value: &PropertyValue,
    ) {
        info!(
            "[Publish] {} registered {} ({}, {}) = {}",
            thing.title, property.name, property.kind, property.mode, value
        );
    }

    fn push_external_update(&self, thing: &ThingDescription, name: &str, value: &PropertyValue) {
        debug!("[Publish] {} {} = {}", thing.title, name, value);
    }
}
