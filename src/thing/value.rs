//! Typed property values and property metadata.
//!
//! Values and type names follow the web-thing schema vocabulary
//! (`string`, `integer`, `number`, `boolean`) so they can be serialized
//! directly into property descriptions and update payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display};

/// A property value as seen by protocol clients.
///
/// Serialized untagged, so `PropertyValue::Integer(500)` becomes `500` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl PropertyValue {
    /// Integer view of the value, accepting integral numbers in `i64` range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            // i64::MAX as f64 rounds up to 2^63, hence the exclusive bound
            PropertyValue::Number(n)
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 =>
            {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    /// Floating point view of numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

/// Semantic type of a property.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
}

impl PropertyType {
    /// Convert a client-supplied value into this type.
    ///
    /// Integers widen to numbers and integral numbers narrow to integers.
    /// Returns `None` when the value cannot represent this type.
    pub fn coerce(&self, value: PropertyValue) -> Option<PropertyValue> {
        match (self, value) {
            (PropertyType::Boolean, v @ PropertyValue::Boolean(_)) => Some(v),
            (PropertyType::String, v @ PropertyValue::String(_)) => Some(v),
            (PropertyType::Integer, v) => v.as_i64().map(PropertyValue::Integer),
            (PropertyType::Number, v) => v.as_f64().map(PropertyValue::Number),
            _ => None,
        }
    }
}

/// Whether protocol clients may write a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_read_only(self) -> bool {
        self == AccessMode::ReadOnly
    }
}

/// Human-readable property metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMetadata {
    pub title: String,
    pub unit: Option<String>,
    pub description: String,
}

impl PropertyMetadata {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            unit: None,
            description: description.into(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Everything the protocol layer needs to advertise one property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyType,
    pub mode: AccessMode,
    pub metadata: PropertyMetadata,
}

impl PropertyDescriptor {
    /// Property description in web-thing schema form.
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = serde_json::json!({
            "title": self.metadata.title,
            "type": self.kind,
            "description": self.metadata.description,
            "readOnly": self.mode.is_read_only(),
        });
        if let Some(unit) = &self.metadata.unit {
            json["unit"] = serde_json::Value::String(unit.clone());
        }
        json
    }
}
