//! Inverter snapshots and the swap cell that publishes them.
//!
//! A polling collaborator owns one [`SnapshotCell`] per inverter. It never
//! mutates a published snapshot in place: each poll builds a new
//! [`Snapshot`] and swaps it in whole, so readers on other threads always see
//! the fields of exactly one polling cycle.

use chrono::{Local, NaiveDateTime};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Listener fired (with no arguments) whenever a snapshot changes.
///
/// May be invoked from any thread.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Readings of one DC input (panel string).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DcChannel {
    /// Channel label as configured on the DTU
    pub name: String,
    /// Voltage [V]
    pub u_dc: f64,
    /// Current [A]
    pub i_dc: f64,
    /// Power [W]
    pub p_dc: f64,
}

/// Latest known readings of one inverter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub serial: String,
    /// DTU can reach the inverter
    pub is_available: bool,
    /// Inverter is feeding power
    pub is_producing: bool,
    /// AC power [W]
    pub p_ac: f64,
    /// AC voltage [V]
    pub u_ac: f64,
    /// AC current [A]
    pub i_ac: f64,
    /// Grid frequency [Hz]
    pub frequency: f64,
    pub power_factor: f64,
    /// Inverter temperature [°C]
    pub temperature: f64,
    /// Efficiency [%]
    pub efficiency: f64,
    /// Energy today [Wh]
    pub yield_day: f64,
    /// Energy total [kWh]
    pub yield_total: f64,
    /// Total DC power [W]
    pub p_dc: f64,
    /// Nameplate maximum power [W]
    pub power_max: f64,
    /// Active power limit [W]
    pub power_limit: i64,
    pub dc: Vec<DcChannel>,
    /// Time of the poll that produced this snapshot
    pub last_update: NaiveDateTime,
}

impl Snapshot {
    /// Empty snapshot for a freshly discovered inverter.
    pub fn new(name: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial: serial.into(),
            is_available: false,
            is_producing: false,
            p_ac: 0.0,
            u_ac: 0.0,
            i_ac: 0.0,
            frequency: 0.0,
            power_factor: 0.0,
            temperature: 0.0,
            efficiency: 0.0,
            yield_day: 0.0,
            yield_total: 0.0,
            p_dc: 0.0,
            power_max: 0.0,
            power_limit: 0,
            dc: Vec::new(),
            last_update: Local::now().naive_local(),
        }
    }
}

/// Atomically swapped snapshot plus its change listeners.
pub struct SnapshotCell {
    current: RwLock<Arc<Snapshot>>,
    listeners: RwLock<Vec<ChangeListener>>,
}

impl SnapshotCell {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The current snapshot. Never blocks on a running poll for longer than the swap.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Build the next snapshot from the current one and swap it in.
    ///
    /// Listeners fire only if the result differs from the current snapshot.
    /// Returns whether a change was published.
    pub fn update(&self, f: impl FnOnce(&mut Snapshot)) -> bool {
        let changed = {
            let mut current = self.current.write();
            let mut next = Snapshot::clone(&current);
            f(&mut next);
            if next == **current {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        };
        if changed {
            self.notify();
        }
        changed
    }

    pub fn subscribe(&self, listener: ChangeListener) {
        self.listeners.write().push(listener);
    }

    fn notify(&self) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_listener(cell: &SnapshotCell) -> Arc<AtomicU32> {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        cell.subscribe(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[test]
    fn test_update_notifies_only_on_change() {
        let cell = SnapshotCell::new(Snapshot::new("HM-600", "114182912345"));
        let count = counting_listener(&cell);

        assert!(cell.update(|s| s.p_ac = 100.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(!cell.update(|s| s.p_ac = 100.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(cell.load().p_ac, 100.0);
    }

    #[test]
    fn test_loaded_snapshot_is_stable_across_swaps() {
        let cell = SnapshotCell::new(Snapshot::new("HM-600", "114182912345"));
        let before = cell.load();
        cell.update(|s| {
            s.p_ac = 150.0;
            s.u_ac = 231.0;
        });
        assert_eq!(before.p_ac, 0.0);
        assert_eq!(before.u_ac, 0.0);
        assert_eq!(cell.load().p_ac, 150.0);
    }
}
