mod power_reading;
mod telemetry_snapshot;

pub use power_reading::PowerReading;
pub use telemetry_snapshot::{DecodeError, TelemetrySnapshot, SNAPSHOT_KIND};
