//! Publisher that records every call, for tests.

use super::{PropertyPublisher, ThingDescription};
use crate::thing::{PropertyDescriptor, PropertyValue};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Published {
    Registered {
        thing_id: String,
        name: String,
        value: PropertyValue,
    },
    Updated {
        thing_id: String,
        name: String,
        value: PropertyValue,
    },
}

#[derive(Default)]
pub(crate) struct RecordingPublisher {
    calls: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub(crate) fn calls(&self) -> Vec<Published> {
        self.calls.lock().clone()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Names of updated properties, in push order.
    pub(crate) fn updated_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Published::Updated { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn registered_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Published::Registered { .. }))
            .count()
    }
}

impl PropertyPublisher for RecordingPublisher {
    fn register_property(
        &self,
        thing: &ThingDescription,
        property: &PropertyDescriptor,
        value: &PropertyValue,
    ) {
        self.calls.lock().push(Published::Registered {
            thing_id: thing.id.clone(),
            name: property.name.clone(),
            value: value.clone(),
        });
    }

    fn push_external_update(&self, thing: &ThingDescription, name: &str, value: &PropertyValue) {
        self.calls.lock().push(Published::Updated {
            thing_id: thing.id.clone(),
            name: name.to_string(),
            value: value.clone(),
        });
    }
}
