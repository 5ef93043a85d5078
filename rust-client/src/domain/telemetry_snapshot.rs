use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::PowerReading;

/// Store kind (table) holding one row per snapshot.
pub const SNAPSHOT_KIND: &str = "battery_output_data";

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed telemetry payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("telemetry payload must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },
    #[error("non-finite value in {channel}.{field}")]
    NonFinite {
        channel: &'static str,
        field: &'static str,
    },
}

/// One polling cycle: six channel readings stamped with the local time at
/// which decoding completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub data_point_time: OffsetDateTime,
    pub site: PowerReading,
    pub battery: PowerReading,
    pub load: PowerReading,
    pub solar: PowerReading,
    pub busway: PowerReading,
    pub frequency: PowerReading,
}

/// Body of `GET /api/meters/aggregates`.
#[derive(Deserialize)]
struct AggregatesPayload {
    #[serde(default, deserialize_with = "reading_or_default")]
    site: PowerReading,
    #[serde(default, deserialize_with = "reading_or_default")]
    battery: PowerReading,
    #[serde(default, deserialize_with = "reading_or_default")]
    load: PowerReading,
    #[serde(default, deserialize_with = "reading_or_default")]
    solar: PowerReading,
    #[serde(default, deserialize_with = "reading_or_default")]
    busway: PowerReading,
    #[serde(default, deserialize_with = "reading_or_default")]
    frequency: PowerReading,
}

/// A channel is an object or `null`. Arrays are refused rather than read
/// positionally into the reading's fields.
fn reading_or_default<'de, D>(deserializer: D) -> Result<PowerReading, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Map<String, Value>>::deserialize(deserializer)? {
        Some(fields) => PowerReading::deserialize(Value::Object(fields)).map_err(D::Error::custom),
        None => Ok(PowerReading::default()),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl TelemetrySnapshot {
    /// Decode an aggregates response body.
    ///
    /// Unknown keys are ignored and missing values become zero. Anything that
    /// is not a well-formed JSON object is rejected as a whole. Any timestamp
    /// embedded in the payload is ignored; `data_point_time` is taken from the
    /// local clock once decoding has succeeded.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject {
                found: json_type_name(&value),
            });
        }

        let payload: AggregatesPayload = serde_json::from_value(value)?;
        let snapshot = TelemetrySnapshot {
            data_point_time: OffsetDateTime::UNIX_EPOCH,
            site: payload.site,
            battery: payload.battery,
            load: payload.load,
            solar: payload.solar,
            busway: payload.busway,
            frequency: payload.frequency,
        };

        for (channel, reading) in snapshot.channels() {
            if let Some(field) = reading.first_non_finite() {
                return Err(DecodeError::NonFinite { channel, field });
            }
        }

        Ok(TelemetrySnapshot {
            data_point_time: OffsetDateTime::now_utc(),
            ..snapshot
        })
    }

    pub fn channels(&self) -> [(&'static str, &PowerReading); 6] {
        [
            ("site", &self.site),
            ("battery", &self.battery),
            ("load", &self.load),
            ("solar", &self.solar),
            ("busway", &self.busway),
            ("frequency", &self.frequency),
        ]
    }
}
