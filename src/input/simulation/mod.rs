//! Simulated inverters for development without a DTU.
//!
//! Each simulated inverter produces a sine-shaped output over a short
//! "day" and honors power limit commands on its next tick, the way a real
//! inverter picks up a new limit on a later polling cycle.

use crate::device::{ChangeListener, DcChannel, DeviceDiscovery, Inverter, Snapshot, SnapshotCell};
use crate::error::{BridgeError, Result};
use crate::thing::{POWER_LIMIT, PropertyValue};
use async_trait::async_trait;
use chrono::Local;
use log::info;
use parking_lot::Mutex;
use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;

/// Nameplate power of a simulated inverter [W]
const SIMULATED_MAX_POWER: f64 = 800.0;

/// Ticks in one simulated day
const TICKS_PER_DAY: u64 = 120;

pub struct SimulatedInverter {
    cell: SnapshotCell,
    /// Limit requested by a client, picked up on the next tick
    requested_limit: AtomicI64,
}

impl SimulatedInverter {
    pub fn new(name: &str, serial: &str) -> Self {
        let mut snapshot = Snapshot::new(name, serial);
        snapshot.power_max = SIMULATED_MAX_POWER;
        snapshot.power_limit = SIMULATED_MAX_POWER as i64;
        snapshot.dc = vec![
            DcChannel {
                name: "East".into(),
                ..DcChannel::default()
            },
            DcChannel {
                name: "West".into(),
                ..DcChannel::default()
            },
        ];
        Self {
            cell: SnapshotCell::new(snapshot),
            requested_limit: AtomicI64::new(SIMULATED_MAX_POWER as i64),
        }
    }

    /// Advance the simulation to `tick` and publish the new snapshot.
    pub fn tick(&self, tick: u64) {
        let phase = (tick % TICKS_PER_DAY) as f64 / TICKS_PER_DAY as f64;
        let sun = (phase * PI).sin().max(0.0);
        let limit = self.requested_limit.load(Ordering::SeqCst);

        self.cell.update(|s| {
            s.power_limit = limit;
            let p_dc = (SIMULATED_MAX_POWER * sun).min(limit as f64);
            let efficiency = if p_dc > 0.0 { 95.5 } else { 0.0 };
            let p_ac = p_dc * efficiency / 100.0;

            s.is_available = true;
            s.is_producing = p_ac > 0.0;
            s.p_dc = round(p_dc);
            s.p_ac = round(p_ac);
            s.u_ac = 230.0;
            s.i_ac = round(p_ac / 230.0);
            s.frequency = 50.0;
            s.power_factor = 1.0;
            s.efficiency = efficiency;
            s.temperature = round(20.0 + 25.0 * sun);
            s.yield_day = round(s.yield_day + p_ac / 3600.0);
            for channel in s.dc.iter_mut() {
                channel.p_dc = round(p_dc / 2.0);
                channel.u_dc = if p_dc > 0.0 { 32.0 } else { 0.0 };
                channel.i_dc = if p_dc > 0.0 {
                    round(channel.p_dc / 32.0)
                } else {
                    0.0
                };
            }
            s.last_update = Local::now().naive_local();
        });
    }
}

fn round(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Inverter for SimulatedInverter {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.cell.load()
    }

    fn set_command(&self, field: &str, value: &PropertyValue) -> Result<()> {
        if field != POWER_LIMIT {
            return Err(BridgeError::UnsupportedCommand(field.to_string()));
        }
        let watts = value.as_i64().ok_or_else(|| BridgeError::InvalidValue {
            field: field.to_string(),
            expected: "integer".to_string(),
        })?;
        info!("[Sim] Power limit {} W requested", watts);
        self.requested_limit
            .store(watts.clamp(0, SIMULATED_MAX_POWER as i64), Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.cell.subscribe(listener);
    }
}

/// Discovery returning `count` simulated inverters, ticking every `period`.
pub struct SimulatedDtu {
    count: usize,
    period: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedDtu {
    pub fn new(count: usize, period: Duration, cancel: CancellationToken) -> Self {
        Self {
            count,
            period,
            cancel,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DeviceDiscovery for SimulatedDtu {
    async fn connect(&self, target: &str) -> Result<Vec<Arc<dyn Inverter>>> {
        info!("[Sim] Simulating {} inverter(s) for {}", self.count, target);
        let inverters: Vec<Arc<SimulatedInverter>> = (0..self.count)
            .map(|i| {
                Arc::new(SimulatedInverter::new(
                    &format!("Sim {}", i + 1),
                    &format!("99{:010}", i + 1),
                ))
            })
            .collect();

        let ticking = inverters.clone();
        let period = self.period;
        let cancel = self.cancel.child_token();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut tick = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tick += 1;
                        for inverter in &ticking {
                            inverter.tick(tick);
                        }
                    }
                }
            }
        });
        *self.task.lock() = Some(task);

        Ok(inverters
            .into_iter()
            .map(|i| i as Arc<dyn Inverter>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_tick_produces_and_notifies() {
        let inverter = SimulatedInverter::new("Sim 1", "9900000001");
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        inverter.subscribe(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        inverter.tick(TICKS_PER_DAY / 2);

        let snapshot = inverter.snapshot();
        assert!(snapshot.is_producing);
        assert!(snapshot.p_ac > 700.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_power_limit_applies_on_next_tick() {
        let inverter = SimulatedInverter::new("Sim 1", "9900000001");
        inverter.tick(TICKS_PER_DAY / 2);

        inverter
            .set_command(POWER_LIMIT, &PropertyValue::Integer(300))
            .unwrap();
        assert_eq!(inverter.snapshot().power_limit, 800);

        inverter.tick(TICKS_PER_DAY / 2 + 1);
        let snapshot = inverter.snapshot();
        assert_eq!(snapshot.power_limit, 300);
        assert!(snapshot.p_dc <= 300.0);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let inverter = SimulatedInverter::new("Sim 1", "9900000001");
        let result = inverter.set_command("p_ac", &PropertyValue::Number(1.0));
        assert!(matches!(result, Err(BridgeError::UnsupportedCommand(_))));
    }
}
