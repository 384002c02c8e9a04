//! Declarative table of published inverter properties.
//!
//! One row per property drives both registration and diff-and-apply, so the
//! published property set is defined in exactly one place.

use super::value::{AccessMode, PropertyMetadata, PropertyType, PropertyValue};
use crate::device::{DcChannel, Snapshot};

/// Name of the only client-writable property.
pub const POWER_LIMIT: &str = "power_limit";

/// Name of the liveness timestamp property.
pub const LAST_UPDATE: &str = "last_update";

/// ISO-8601 format used for timestamp properties.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// How a field's value is read from a snapshot.
#[derive(Clone, Copy)]
enum Accessor {
    Device(fn(&Snapshot) -> PropertyValue),
    DcChannel(usize, fn(&DcChannel) -> PropertyValue),
}

/// One published property: name, type, access mode, metadata and accessor.
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: PropertyType,
    pub mode: AccessMode,
    pub metadata: PropertyMetadata,
    /// Re-applied on every cycle, even when unchanged
    pub timestamp: bool,
    accessor: Accessor,
}

impl FieldSpec {
    /// Read this field from a snapshot.
    ///
    /// A DC channel the snapshot does not (yet) report reads as zero.
    pub fn read(&self, snapshot: &Snapshot) -> PropertyValue {
        match self.accessor {
            Accessor::Device(read) => read(snapshot),
            Accessor::DcChannel(index, read) => snapshot
                .dc
                .get(index)
                .map(read)
                .unwrap_or(PropertyValue::Number(0.0)),
        }
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .finish()
    }
}

struct DeviceRow {
    name: &'static str,
    kind: PropertyType,
    mode: AccessMode,
    title: &'static str,
    unit: Option<&'static str>,
    description: &'static str,
    read: fn(&Snapshot) -> PropertyValue,
}

static DEVICE_FIELDS: &[DeviceRow] = &[
    DeviceRow {
        name: "name",
        kind: PropertyType::String,
        mode: AccessMode::ReadOnly,
        title: "Name",
        unit: None,
        description: "The inverter name",
        read: |s| PropertyValue::String(s.name.clone()),
    },
    DeviceRow {
        name: "serial",
        kind: PropertyType::String,
        mode: AccessMode::ReadOnly,
        title: "Serial",
        unit: None,
        description: "The serial number",
        read: |s| PropertyValue::String(s.serial.clone()),
    },
    DeviceRow {
        name: "is_available",
        kind: PropertyType::Boolean,
        mode: AccessMode::ReadOnly,
        title: "Available",
        unit: None,
        description: "True if the DTU can reach the inverter",
        read: |s| PropertyValue::Boolean(s.is_available),
    },
    DeviceRow {
        name: "is_producing",
        kind: PropertyType::Boolean,
        mode: AccessMode::ReadOnly,
        title: "Producing",
        unit: None,
        description: "True if the inverter is feeding power",
        read: |s| PropertyValue::Boolean(s.is_producing),
    },
    DeviceRow {
        name: "p_dc",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Power DC",
        unit: Some("watt"),
        description: "The total power DC [W]",
        read: |s| PropertyValue::Number(s.p_dc),
    },
    DeviceRow {
        name: "p_ac",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Power AC",
        unit: Some("watt"),
        description: "The power AC [W]",
        read: |s| PropertyValue::Number(s.p_ac),
    },
    DeviceRow {
        name: "u_ac",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Voltage AC",
        unit: Some("volt"),
        description: "The voltage AC [V]",
        read: |s| PropertyValue::Number(s.u_ac),
    },
    DeviceRow {
        name: "i_ac",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Current AC",
        unit: Some("ampere"),
        description: "The current AC [A]",
        read: |s| PropertyValue::Number(s.i_ac),
    },
    DeviceRow {
        name: "frequency",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Frequency",
        unit: Some("hertz"),
        description: "The grid frequency [Hz]",
        read: |s| PropertyValue::Number(s.frequency),
    },
    DeviceRow {
        name: "power_factor",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Power factor",
        unit: None,
        description: "The power factor AC",
        read: |s| PropertyValue::Number(s.power_factor),
    },
    DeviceRow {
        name: "temperature",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Temperature",
        unit: Some("degree celsius"),
        description: "The inverter temperature [°C]",
        read: |s| PropertyValue::Number(s.temperature),
    },
    DeviceRow {
        name: "efficiency",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Efficiency",
        unit: Some("percent"),
        description: "The efficiency [%]",
        read: |s| PropertyValue::Number(s.efficiency),
    },
    DeviceRow {
        name: "yield_day",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Yield today",
        unit: Some("watt hour"),
        description: "The energy produced today [Wh]",
        read: |s| PropertyValue::Number(s.yield_day),
    },
    DeviceRow {
        name: "yield_total",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Yield total",
        unit: Some("kilowatt hour"),
        description: "The energy produced in total [kWh]",
        read: |s| PropertyValue::Number(s.yield_total),
    },
    DeviceRow {
        name: "power_max",
        kind: PropertyType::Number,
        mode: AccessMode::ReadOnly,
        title: "Max power",
        unit: Some("watt"),
        description: "The nameplate maximum power [W]",
        read: |s| PropertyValue::Number(s.power_max),
    },
    DeviceRow {
        name: POWER_LIMIT,
        kind: PropertyType::Integer,
        mode: AccessMode::ReadWrite,
        title: "Power limit",
        unit: Some("watt"),
        description: "The active power limit [W]. Writes are forwarded to the inverter",
        read: |s| PropertyValue::Integer(s.power_limit),
    },
    DeviceRow {
        name: LAST_UPDATE,
        kind: PropertyType::String,
        mode: AccessMode::ReadOnly,
        title: "Last update",
        unit: None,
        description: "The date of the last reading [ISO DateTime]",
        read: |s| PropertyValue::String(s.last_update.format(TIMESTAMP_FORMAT).to_string()),
    },
];

/// Per-channel DC readings: (suffix, title, unit, accessor)
static DC_FIELDS: &[(&str, &str, &str, fn(&DcChannel) -> PropertyValue)] = &[
    ("u_dc", "Voltage DC", "volt", |c| PropertyValue::Number(c.u_dc)),
    ("i_dc", "Current DC", "ampere", |c| PropertyValue::Number(c.i_dc)),
    ("p_dc", "Power DC", "watt", |c| PropertyValue::Number(c.p_dc)),
];

/// All published fields of an inverter with `dc_channels` DC inputs.
///
/// DC channels are numbered from 1 (`u_dc1`, `i_dc1`, `p_dc1`, ...).
pub fn inverter_fields(dc_channels: usize) -> Vec<FieldSpec> {
    let mut fields: Vec<FieldSpec> = DEVICE_FIELDS
        .iter()
        .map(|row| FieldSpec {
            name: row.name.to_string(),
            kind: row.kind,
            mode: row.mode,
            metadata: PropertyMetadata {
                title: row.title.to_string(),
                unit: row.unit.map(str::to_string),
                description: row.description.to_string(),
            },
            timestamp: row.name == LAST_UPDATE,
            accessor: Accessor::Device(row.read),
        })
        .collect();

    for index in 0..dc_channels {
        let number = index + 1;
        for (suffix, title, unit, read) in DC_FIELDS {
            fields.push(FieldSpec {
                name: format!("{}{}", suffix, number),
                kind: PropertyType::Number,
                mode: AccessMode::ReadOnly,
                metadata: PropertyMetadata::new(
                    format!("{} {}", title, number),
                    format!("The {} of DC input {}", title.to_lowercase(), number),
                )
                .with_unit(*unit),
                timestamp: false,
                accessor: Accessor::DcChannel(index, *read),
            });
        }
    }

    fields
}
