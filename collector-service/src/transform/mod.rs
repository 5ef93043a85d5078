use rust_client::domain::TelemetrySnapshot;

/// Human-readable broadcast derived from the solar channel.
///
/// `f64`'s `Display` drops a zero fractional part, so 1500.0 reads as
/// `"Current Solar Output 1500"`.
pub fn solar_summary(snapshot: &TelemetrySnapshot) -> String {
    format!("Current Solar Output {}", snapshot.solar.instant_power)
}
