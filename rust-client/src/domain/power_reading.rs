use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Instantaneous state of one metering channel (site, battery, load, ...).
///
/// Every numeric field tolerates absence: a missing key or a JSON `null`
/// decodes to `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_communication_time: Option<OffsetDateTime>,
    /// Real power, W.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub instant_power: f64,
    /// Reactive power, VAR.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub instant_reactive_power: f64,
    /// Apparent power, VA.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub instant_apparent_power: f64,
    /// Line frequency, Hz.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub frequency: f64,
    /// Cumulative export, Wh.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub energy_exported: f64,
    /// Cumulative import, Wh.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub energy_imported: f64,
    /// Average line voltage, V.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub instant_average_voltage: f64,
    /// Total current, A.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub instant_total_current: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub i_a_current: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub i_b_current: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub i_c_current: f64,
}

impl PowerReading {
    /// Name of the first numeric field holding NaN or an infinity, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        let fields = [
            ("instant_power", self.instant_power),
            ("instant_reactive_power", self.instant_reactive_power),
            ("instant_apparent_power", self.instant_apparent_power),
            ("frequency", self.frequency),
            ("energy_exported", self.energy_exported),
            ("energy_imported", self.energy_imported),
            ("instant_average_voltage", self.instant_average_voltage),
            ("instant_total_current", self.instant_total_current),
            ("i_a_current", self.i_a_current),
            ("i_b_current", self.i_b_current),
            ("i_c_current", self.i_c_current),
        ];

        fields
            .into_iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| name)
    }
}

fn zero_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
