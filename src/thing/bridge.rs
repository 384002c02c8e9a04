//! Update bridge between one inverter and its property registry.
//!
//! Forward flow: the polling collaborator fires a change listener (on its own
//! thread) → [`UpdateBridge::on_change_signal`] schedules a refresh on the
//! consumer context → [`UpdateBridge::diff_and_apply`] copies the snapshot
//! into the registry.
//!
//! Reverse flow: a client write reaches [`PropertyRegistry::write_requested`]
//! → the forwarder installed by [`UpdateBridge::attach`] →
//! [`UpdateBridge::forward_write`] → [`Inverter::set_command`].
//!
//! Signals arriving while a refresh is already queued are coalesced. That
//! never loses data because every refresh re-reads the latest snapshot.

use super::consumer::{ConsumerHandle, ConsumerTask};
use super::fields::FieldSpec;
use super::registry::PropertyRegistry;
use super::value::{AccessMode, PropertyValue};
use crate::device::Inverter;
use crate::error::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct UpdateBridge {
    /// Position of this bridge's thing in the consumer's thing list
    key: usize,
    inverter: Arc<dyn Inverter>,
    fields: Vec<FieldSpec>,
    consumer: ConsumerHandle,
    /// A refresh is queued and has not started yet
    pending: AtomicBool,
}

impl UpdateBridge {
    pub fn new(
        key: usize,
        inverter: Arc<dyn Inverter>,
        fields: Vec<FieldSpec>,
        consumer: ConsumerHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            inverter,
            fields,
            consumer,
            pending: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> usize {
        self.key
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Register every field from the current snapshot and wire the
    /// forwarders of writable fields back to this bridge.
    pub fn attach(self: &Arc<Self>, registry: &mut PropertyRegistry) -> Result<()> {
        let snapshot = self.inverter.snapshot();
        for field in &self.fields {
            registry.register(
                &field.name,
                field.kind,
                field.mode,
                field.metadata.clone(),
                field.read(&snapshot),
            )?;
        }

        for field in self.fields.iter().filter(|f| f.mode == AccessMode::ReadWrite) {
            let bridge_weak = Arc::downgrade(self);
            let name = field.name.clone();
            registry.on_write(
                &field.name,
                Arc::new(move |value| {
                    if let Some(bridge) = bridge_weak.upgrade() {
                        bridge.forward_write(&name, value);
                    }
                }),
            )?;
        }
        Ok(())
    }

    /// Subscribe this bridge to the inverter's change notifications.
    pub fn subscribe(self: &Arc<Self>) {
        let bridge_weak = Arc::downgrade(self);
        self.inverter.subscribe(Arc::new(move || {
            if let Some(bridge) = bridge_weak.upgrade() {
                bridge.on_change_signal();
            }
        }));
    }

    /// Schedule a refresh on the consumer context. Safe to call from any thread.
    ///
    /// At most one refresh is queued at a time; further signals before it
    /// starts are absorbed by it.
    pub fn on_change_signal(&self) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.consumer.submit(ConsumerTask::Refresh(self.key)).is_err() {
            self.pending.store(false, Ordering::SeqCst);
            debug!("[Bridge] Consumer gone, dropping change signal");
        }
    }

    /// Whether a refresh is queued but has not started.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Bring the registry in line with the current snapshot.
    ///
    /// Must run on the consumer context. Reads the snapshot once, applies
    /// every changed field plus every timestamp field, and returns the number
    /// of applied updates.
    pub fn diff_and_apply(&self, registry: &mut PropertyRegistry) -> Result<usize> {
        // Cleared before the read: a signal racing with this refresh
        // schedules another one instead of being absorbed.
        self.pending.store(false, Ordering::SeqCst);

        let snapshot = self.inverter.snapshot();
        let mut applied = 0;
        for field in &self.fields {
            let value = field.read(&snapshot);
            if field.timestamp || registry.value(&field.name) != Some(&value) {
                registry.apply(&field.name, value)?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Forward a client write to the inverter. Fire-and-forget.
    pub fn forward_write(&self, name: &str, value: PropertyValue) {
        info!(
            "[Bridge] Forwarding {} = {} to {}",
            name,
            value,
            self.inverter.identity().title()
        );
        if let Err(e) = self.inverter.set_command(name, &value) {
            warn!("[Bridge] Command {} = {} not accepted: {}", name, value, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::FakeInverter;
    use crate::publish::ThingDescription;
    use crate::publish::recording::RecordingPublisher;
    use crate::thing::consumer::consumer_channel;
    use crate::thing::fields::{LAST_UPDATE, POWER_LIMIT, inverter_fields};

    fn thing() -> ThingDescription {
        ThingDescription {
            id: "urn:dev:ops:inverter-1".into(),
            slug: "inverter-1".into(),
            title: "Inverter HM-600".into(),
            description: "test".into(),
            capabilities: vec![],
        }
    }

    fn setup() -> (
        Arc<FakeInverter>,
        Arc<UpdateBridge>,
        PropertyRegistry,
        Arc<RecordingPublisher>,
        crate::thing::consumer::ConsumerLoop,
    ) {
        let inverter = Arc::new(FakeInverter::new("HM-600", "1"));
        inverter.cell.update(|s| {
            s.p_ac = 100.0;
            s.u_ac = 230.0;
        });
        let publisher = Arc::new(RecordingPublisher::default());
        let mut registry = PropertyRegistry::new(thing(), publisher.clone());
        let (handle, consumer) = consumer_channel();
        let bridge = UpdateBridge::new(0, inverter.clone(), inverter_fields(0), handle);
        bridge.subscribe();
        bridge.attach(&mut registry).unwrap();
        publisher.clear();
        (inverter, bridge, registry, publisher, consumer)
    }

    #[test]
    fn test_attach_registers_from_snapshot() {
        let (_inverter, bridge, registry, _publisher, _consumer) = setup();
        assert_eq!(registry.len(), bridge.fields().len());
        assert_eq!(registry.value("p_ac"), Some(&PropertyValue::Number(100.0)));
        assert_eq!(registry.value("u_ac"), Some(&PropertyValue::Number(230.0)));
    }

    #[test]
    fn test_diff_applies_changed_fields_and_timestamp() {
        let (inverter, bridge, mut registry, publisher, _consumer) = setup();
        inverter.cell.update(|s| {
            s.p_ac = 150.0;
            s.last_update += chrono::Duration::seconds(15);
        });

        let applied = bridge.diff_and_apply(&mut registry).unwrap();

        assert_eq!(applied, 2);
        assert_eq!(
            publisher.updated_names(),
            vec!["p_ac".to_string(), LAST_UPDATE.to_string()]
        );
        assert_eq!(registry.value("p_ac"), Some(&PropertyValue::Number(150.0)));
        assert_eq!(registry.value("u_ac"), Some(&PropertyValue::Number(230.0)));
    }

    #[test]
    fn test_diff_is_idempotent() {
        let (inverter, bridge, mut registry, publisher, _consumer) = setup();
        inverter.cell.update(|s| s.p_ac = 150.0);
        bridge.diff_and_apply(&mut registry).unwrap();
        let after_first: Vec<_> = registry.entries().cloned().collect();
        publisher.clear();

        let applied = bridge.diff_and_apply(&mut registry).unwrap();

        assert_eq!(applied, 1);
        assert_eq!(publisher.updated_names(), vec![LAST_UPDATE.to_string()]);
        assert_eq!(registry.entries().cloned().collect::<Vec<_>>(), after_first);
    }

    #[test]
    fn test_signals_coalesce_until_refresh_starts() {
        let (inverter, bridge, mut registry, _publisher, mut consumer) = setup();
        let mut things: Vec<crate::thing::Thing> = Vec::new();

        for p_ac in [110.0, 120.0, 130.0] {
            inverter.cell.update(|s| s.p_ac = p_ac);
        }
        assert!(bridge.is_pending());

        // Three signals, one queued refresh
        let mut queued = 0;
        while let Some(task) = consumer.try_next() {
            assert!(matches!(task, ConsumerTask::Refresh(0)));
            queued += 1;
        }
        assert_eq!(queued, 1);

        bridge.diff_and_apply(&mut registry).unwrap();
        assert!(!bridge.is_pending());
        assert_eq!(registry.value("p_ac"), Some(&PropertyValue::Number(130.0)));

        // A signal after the refresh started schedules a new one
        inverter.cell.update(|s| s.p_ac = 140.0);
        assert!(bridge.is_pending());
        assert_eq!(consumer.drain(&mut things), 1);
    }

    #[test]
    fn test_forward_write_sends_exact_command() {
        let (inverter, _bridge, registry, publisher, _consumer) = setup();

        registry
            .write_requested(POWER_LIMIT, PropertyValue::Integer(500))
            .unwrap();

        assert_eq!(
            inverter.commands(),
            vec![(POWER_LIMIT.to_string(), PropertyValue::Integer(500))]
        );
        assert_eq!(registry.value(POWER_LIMIT), Some(&PropertyValue::Integer(0)));
        assert!(publisher.calls().is_empty());
    }

    #[test]
    fn test_read_only_write_sends_nothing() {
        let (inverter, _bridge, registry, _publisher, _consumer) = setup();
        let result = registry.write_requested("p_ac", PropertyValue::Number(1.0));
        assert!(matches!(
            result,
            Err(crate::error::BridgeError::ReadOnlyField(_))
        ));
        assert!(inverter.commands().is_empty());
    }

    #[test]
    fn test_rejected_command_is_not_raised() {
        let (inverter, bridge, _registry, _publisher, _consumer) = setup();
        inverter.reject_commands();
        bridge.forward_write(POWER_LIMIT, PropertyValue::Integer(500));
        assert!(inverter.commands().is_empty());
    }
}
