//! Property-publishing protocol layer.
//!
//! The core only needs two outbound operations from the protocol layer
//! (announce a property, push an external update) and one inbound path
//! (client writes, delivered as [`ConsumerTask::ClientWrite`] through a
//! [`ConsumerHandle`]).
//!
//! [`ConsumerTask::ClientWrite`]: crate::thing::ConsumerTask::ClientWrite
//! [`ConsumerHandle`]: crate::thing::ConsumerHandle

mod log;
mod mqtt;
#[cfg(test)]
pub(crate) mod recording;

pub use self::log::LogPublisher;
pub use mqtt::{MqttConnection, MqttPublisher, SetRequest};

use crate::thing::{PropertyDescriptor, PropertyValue};
use serde::Serialize;

/// Identity and description of one published thing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThingDescription {
    pub id: String,
    /// Topic/path-safe identifier
    #[serde(skip)]
    pub slug: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "@type")]
    pub capabilities: Vec<String>,
}

/// Outbound operations of the protocol layer.
///
/// Called only from the consumer context. Implementations must not block.
pub trait PropertyPublisher: Send + Sync {
    /// Announce a property together with its initial value.
    fn register_property(
        &self,
        thing: &ThingDescription,
        property: &PropertyDescriptor,
        value: &PropertyValue,
    );

    /// Push a changed value to subscribed clients.
    fn push_external_update(&self, thing: &ThingDescription, name: &str, value: &PropertyValue);
}
