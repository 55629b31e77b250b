//! ==============================================================================
//! domain.rs - readings, snapshots and store rows
//! ==============================================================================
//!
//! purpose:
//!     the data the device reports and the shapes it takes on its way through
//!     the hub:
//!
//! ```text
//!         device json ──► ReadingPayload ──validate──► Reading
//!                                                        │
//!                                    Snapshot { reading, captured_at }
//!                                                        │
//!                                    StoredReading (row in the hosted table)
//! ```
//!
//! relationships:
//!     - used by: snapshot.rs, coordinator.rs, gateway/*, http.rs
//!
//! ==============================================================================

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ==============================================================================
// channels
// ==============================================================================

pub const TEMPERATURE1: &str = "temperature1";
pub const HUMIDITY1: &str = "humidity1";
pub const TEMPERATURE2: &str = "temperature2";
pub const HUMIDITY2: &str = "humidity2";
pub const SOIL_MOISTURE1: &str = "soil_moisture1";
pub const SOIL_MOISTURE2: &str = "soil_moisture2";
pub const UV_INDEX: &str = "uv_index";

/// channels a reading cannot be accepted without
pub const MANDATORY_CHANNELS: [&str; 2] = [TEMPERATURE1, HUMIDITY1];

/// every accepted spelling for each channel, canonical name first.
/// `temperature` / `humidity` come from the single-sensor firmware.
const CHANNEL_ALIASES: [(&str, &[&str]); 7] = [
    (TEMPERATURE1, &["temperature1", "temperature"]),
    (HUMIDITY1, &["humidity1", "humidity"]),
    (TEMPERATURE2, &["temperature2"]),
    (HUMIDITY2, &["humidity2"]),
    (SOIL_MOISTURE1, &["soil_moisture1", "soilMoisture1"]),
    (SOIL_MOISTURE2, &["soil_moisture2", "soilMoisture2"]),
    (UV_INDEX, &["uv_index", "uvIndex"]),
];

/// One complete set of channel values from a single capture instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature1: f64,
    pub humidity1: f64,
    pub temperature2: f64,
    pub humidity2: f64,
    pub soil_moisture1: f64,
    pub soil_moisture2: f64,
    pub uv_index: f64,
}

impl Reading {
    /// (channel name, value) pairs in a stable order
    pub fn channels(&self) -> [(&'static str, f64); 7] {
        [
            (TEMPERATURE1, self.temperature1),
            (HUMIDITY1, self.humidity1),
            (TEMPERATURE2, self.temperature2),
            (HUMIDITY2, self.humidity2),
            (SOIL_MOISTURE1, self.soil_moisture1),
            (SOIL_MOISTURE2, self.soil_moisture2),
            (UV_INDEX, self.uv_index),
        ]
    }

    fn set(&mut self, channel: &str, value: f64) {
        match channel {
            TEMPERATURE1 => self.temperature1 = value,
            HUMIDITY1 => self.humidity1 = value,
            TEMPERATURE2 => self.temperature2 = value,
            HUMIDITY2 => self.humidity2 = value,
            SOIL_MOISTURE1 => self.soil_moisture1 = value,
            SOIL_MOISTURE2 => self.soil_moisture2 = value,
            UV_INDEX => self.uv_index = value,
            _ => {}
        }
    }
}

/// The current reading together with when it was captured.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub reading: Reading,
    pub captured_at: DateTime<Utc>,
}

// ==============================================================================
// inbound payload
// ==============================================================================
// the firmware has shipped with several field spellings and sometimes sends
// numbers as strings. we keep the raw object and decide per channel.

/// Raw reading fields as posted by the device.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ReadingPayload(Map<String, Value>);

impl ReadingPayload {
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ValidationError::NotAnObject),
        }
    }

    /// Parse a request body. An empty body means "no reading".
    pub fn from_body(body: &[u8]) -> Result<Option<Self>, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::from_value(value).map(Some)
    }

    /// true when none of the known channel spellings is present
    pub fn is_empty(&self) -> bool {
        CHANNEL_ALIASES
            .iter()
            .all(|(_, names)| names.iter().all(|n| self.0.get(*n).map_or(true, Value::is_null)))
    }

    /// Turn the payload into a full reading.
    ///
    /// Mandatory channels must be present; every missing one is named in the
    /// error. Optional channels default to zero. Non-numeric values are
    /// rejected even on optional channels.
    pub fn validate(&self) -> Result<Reading, ValidationError> {
        let mut reading = Reading::default();
        let mut missing = Vec::new();

        for (channel, names) in CHANNEL_ALIASES {
            let found = names
                .iter()
                .find_map(|name| self.0.get(*name).filter(|v| !v.is_null()).map(|v| (*name, v)));

            match found {
                Some((name, value)) => reading.set(channel, numeric(name, value)?),
                None if MANDATORY_CHANNELS.contains(&channel) => missing.push(channel),
                None => {}
            }
        }

        if !missing.is_empty() {
            return Err(ValidationError::MissingChannels(missing));
        }
        Ok(reading)
    }
}

impl From<Reading> for ReadingPayload {
    fn from(reading: Reading) -> Self {
        let map = reading
            .channels()
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::from(value)))
            .collect();
        Self(map)
    }
}

fn numeric(field: &str, value: &Value) -> Result<f64, ValidationError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::NonNumeric { field: field.to_string() })
}

// ==============================================================================
// store rows
// ==============================================================================

/// A row of the hosted `sensor_data` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub temperature1: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub humidity1: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub temperature2: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub humidity2: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub soil_moisture1: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub soil_moisture2: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub uv_index: f64,
}

impl StoredReading {
    pub fn from_snapshot(snapshot: &Snapshot, device_id: Option<String>) -> Self {
        let r = snapshot.reading;
        Self {
            timestamp: snapshot.captured_at,
            device_id,
            temperature1: r.temperature1,
            humidity1: r.humidity1,
            temperature2: r.temperature2,
            humidity2: r.humidity2,
            soil_moisture1: r.soil_moisture1,
            soil_moisture2: r.soil_moisture2,
            uv_index: r.uv_index,
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            reading: Reading {
                temperature1: self.temperature1,
                humidity1: self.humidity1,
                temperature2: self.temperature2,
                humidity2: self.humidity2,
                soil_moisture1: self.soil_moisture1,
                soil_moisture2: self.soil_moisture2,
                uv_index: self.uv_index,
            },
            captured_at: self.timestamp,
        }
    }
}

/// the hosted table has stored timestamps both with and without a zone
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp `{raw}`")))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}
