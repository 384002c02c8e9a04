//! AhoyDTU REST API payloads and their mapping onto [`Snapshot`].
//!
//! Channel readings arrive as bare number arrays; their meaning is given by
//! the field name lists the DTU reports on `/api/live`. When those are not
//! available the standard layout is assumed.

use crate::device::{DcChannel, Snapshot};
use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};

/// Standard AC (channel 0) field order.
const DEFAULT_AC_FIELDS: &[&str] = &[
    "U_AC",
    "I_AC",
    "P_AC",
    "F_AC",
    "PF_AC",
    "Temp",
    "YieldTotal",
    "YieldDay",
    "P_DC",
    "Efficiency",
    "Q_AC",
    "MaxPower",
];

/// Standard DC channel field order.
const DEFAULT_DC_FIELDS: &[&str] = &[
    "U_DC",
    "I_DC",
    "P_DC",
    "YieldDay",
    "YieldTotal",
    "Irradiation",
    "MaxPower",
];

/// Serial numbers are reported as strings by newer firmware and as
/// numbers by older builds.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        String(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::String(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

fn default_true() -> bool {
    true
}

/// `GET /api/inverter/list`
#[derive(Debug, Clone, Deserialize)]
pub struct InverterList {
    #[serde(default)]
    pub inverter: Vec<InverterListEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InverterListEntry {
    pub id: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub serial: String,
    /// Number of DC inputs
    #[serde(default)]
    pub channels: usize,
}

/// `GET /api/live` (only the field name lists are used)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveFields {
    #[serde(default)]
    pub ch0_fld_names: Vec<String>,
    #[serde(default)]
    pub fld_names: Vec<String>,
}

/// Resolved meaning of the positions in a channel reading array.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    ac: Vec<String>,
    dc: Vec<String>,
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self {
            ac: DEFAULT_AC_FIELDS.iter().map(|s| s.to_string()).collect(),
            dc: DEFAULT_DC_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<LiveFields> for FieldLayout {
    fn from(live: LiveFields) -> Self {
        let default = FieldLayout::default();
        Self {
            ac: if live.ch0_fld_names.is_empty() {
                default.ac
            } else {
                live.ch0_fld_names
            },
            dc: if live.fld_names.is_empty() {
                default.dc
            } else {
                live.fld_names
            },
        }
    }
}

impl FieldLayout {
    fn lookup(names: &[String], values: &[f64], name: &str) -> Option<f64> {
        names
            .iter()
            .position(|n| n == name)
            .and_then(|i| values.get(i).copied())
    }

    fn ac(&self, values: &[f64], name: &str) -> Option<f64> {
        Self::lookup(&self.ac, values, name)
    }

    fn dc(&self, values: &[f64], name: &str) -> Option<f64> {
        Self::lookup(&self.dc, values, name)
    }
}

/// `GET /api/inverter/id/<id>`
#[derive(Debug, Clone, Deserialize)]
pub struct InverterRecord {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub serial: String,
    /// Active limit in percent of `max_pwr`
    #[serde(default)]
    pub power_limit_read: Option<f64>,
    #[serde(default)]
    pub max_pwr: Option<f64>,
    /// Unix time of the last successful radio exchange
    #[serde(default)]
    pub ts_last_success: i64,
    #[serde(default)]
    pub is_avail: Option<bool>,
    #[serde(default)]
    pub is_producing: Option<bool>,
    /// Channel 0 is AC, 1.. are the DC inputs
    #[serde(default)]
    pub ch: Vec<Vec<f64>>,
    #[serde(default)]
    pub ch_name: Vec<String>,
}

/// `POST /api/ctrl`
#[derive(Debug, Clone, Serialize)]
pub struct CtrlRequest {
    pub id: u32,
    pub cmd: &'static str,
    pub val: i64,
}

impl CtrlRequest {
    /// Non-persistent absolute power limit in watts.
    pub fn power_limit(id: u32, watts: i64) -> Self {
        Self {
            id,
            cmd: "limit_nonpersistent_absolute",
            val: watts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CtrlResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Copy one inverter record into a snapshot.
///
/// `stale_after_secs` bounds how old `ts_last_success` may be for the
/// inverter to count as available when the DTU does not say so itself.
pub fn apply_record(
    snapshot: &mut Snapshot,
    record: &InverterRecord,
    layout: &FieldLayout,
    now: DateTime<Local>,
    stale_after_secs: i64,
) {
    if !record.name.is_empty() {
        snapshot.name = record.name.clone();
    }
    snapshot.serial = record.serial.clone();

    if let Some(ac) = record.ch.first() {
        let read = |name: &str| layout.ac(ac, name).unwrap_or(0.0);
        snapshot.u_ac = read("U_AC");
        snapshot.i_ac = read("I_AC");
        snapshot.p_ac = read("P_AC");
        snapshot.frequency = read("F_AC");
        snapshot.power_factor = read("PF_AC");
        snapshot.temperature = read("Temp");
        snapshot.yield_total = read("YieldTotal");
        snapshot.yield_day = read("YieldDay");
        snapshot.p_dc = read("P_DC");
        snapshot.efficiency = read("Efficiency");
    }

    snapshot.dc = record
        .ch
        .iter()
        .skip(1)
        .enumerate()
        .map(|(i, values)| DcChannel {
            name: record.ch_name.get(i + 1).cloned().unwrap_or_default(),
            u_dc: layout.dc(values, "U_DC").unwrap_or(0.0),
            i_dc: layout.dc(values, "I_DC").unwrap_or(0.0),
            p_dc: layout.dc(values, "P_DC").unwrap_or(0.0),
        })
        .collect();

    if let Some(max) = record.max_pwr.filter(|m| *m > 0.0) {
        snapshot.power_max = max;
        if let Some(percent) = record.power_limit_read {
            snapshot.power_limit = (max * percent / 100.0).round() as i64;
        }
    }

    let last_success_age = now.timestamp() - record.ts_last_success;
    snapshot.is_available = record
        .is_avail
        .unwrap_or(record.ts_last_success > 0 && last_success_age <= stale_after_secs);
    snapshot.is_producing = record
        .is_producing
        .unwrap_or(snapshot.is_available && snapshot.p_ac > 0.0);
    snapshot.last_update = now.naive_local();
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "id": 0,
        "enabled": true,
        "name": "Balcony",
        "serial": "114182912345",
        "version": "10012",
        "power_limit_read": 50,
        "max_pwr": 600,
        "ts_last_success": 1717245000,
        "ch": [
            [230.1, 0.65, 150.2, 50.01, 1.0, 31.4, 1234.5, 812, 160.4, 93.6, 0, 600],
            [31.2, 2.5, 78.0, 400, 600.1, 19.5, 300],
            [30.8, 2.65, 82.4, 412, 634.4, 20.6, 300]
        ],
        "ch_name": ["AC", "East", "West"]
    }"#;

    fn at(ts: i64) -> DateTime<Local> {
        DateTime::from_timestamp(ts, 0).unwrap().with_timezone(&Local)
    }

    #[test]
    fn test_apply_record_with_default_layout() {
        let record: InverterRecord = serde_json::from_str(RECORD).unwrap();
        let mut snapshot = Snapshot::new("", "");

        apply_record(&mut snapshot, &record, &FieldLayout::default(), at(1717245010), 45);

        assert_eq!(snapshot.name, "Balcony");
        assert_eq!(snapshot.serial, "114182912345");
        assert_eq!(snapshot.u_ac, 230.1);
        assert_eq!(snapshot.p_ac, 150.2);
        assert_eq!(snapshot.frequency, 50.01);
        assert_eq!(snapshot.efficiency, 93.6);
        assert_eq!(snapshot.p_dc, 160.4);
        assert_eq!(snapshot.dc.len(), 2);
        assert_eq!(snapshot.dc[1].name, "West");
        assert_eq!(snapshot.dc[1].i_dc, 2.65);
        assert_eq!(snapshot.power_max, 600.0);
        assert_eq!(snapshot.power_limit, 300);
        assert!(snapshot.is_available);
        assert!(snapshot.is_producing);
        assert_eq!(snapshot.last_update, at(1717245010).naive_local());
    }

    #[test]
    fn test_stale_record_is_unavailable() {
        let record: InverterRecord = serde_json::from_str(RECORD).unwrap();
        let mut snapshot = Snapshot::new("", "");

        apply_record(&mut snapshot, &record, &FieldLayout::default(), at(1717249000), 45);

        assert!(!snapshot.is_available);
        assert!(!snapshot.is_producing);
    }

    #[test]
    fn test_layout_from_live_fields() {
        let live: LiveFields = serde_json::from_str(
            r#"{"ch0_fld_names": ["P_AC", "U_AC"], "fld_names": [], "refresh": 5}"#,
        )
        .unwrap();
        let layout = FieldLayout::from(live);
        let record: InverterRecord = serde_json::from_str(
            r#"{"id": 1, "serial": 116183771004, "is_avail": false, "ch": [[99.0, 231.0]]}"#,
        )
        .unwrap();
        let mut snapshot = Snapshot::new("Garage", "");

        apply_record(&mut snapshot, &record, &layout, at(0), 45);

        assert_eq!(snapshot.name, "Garage");
        assert_eq!(snapshot.serial, "116183771004");
        assert_eq!(snapshot.p_ac, 99.0);
        assert_eq!(snapshot.u_ac, 231.0);
        assert!(snapshot.dc.is_empty());
        assert!(!snapshot.is_available);
    }

    #[test]
    fn test_inverter_list() {
        let list: InverterList = serde_json::from_str(
            r#"{"inverter": [
                {"id": 0, "enabled": true, "name": "Balcony", "serial": "114182912345", "channels": 2},
                {"id": 1, "enabled": false, "name": "Spare", "serial": 116183771004}
            ], "interval": 15}"#,
        )
        .unwrap();
        assert_eq!(list.inverter.len(), 2);
        assert_eq!(list.inverter[0].channels, 2);
        assert!(!list.inverter[1].enabled);
        assert_eq!(list.inverter[1].serial, "116183771004");
    }

    #[test]
    fn test_ctrl_request_body() {
        let body = serde_json::to_value(CtrlRequest::power_limit(0, 500)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"id": 0, "cmd": "limit_nonpersistent_absolute", "val": 500})
        );
    }
}
