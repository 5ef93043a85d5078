use sqlx::{types::Json, PgPool};

use crate::domain::TelemetrySnapshot;

/// Store-assigned identifier of a persisted snapshot.
pub type RecordKey = i64;

/// Append one snapshot as a new row and return the key the store allocated.
///
/// This is a plain insert: writing the same snapshot twice yields two rows.
/// Schema lives in `sql/schema/01_battery_output_data.sql`.
pub async fn insert_snapshot(
    pool: &PgPool,
    project_id: &str,
    snapshot: &TelemetrySnapshot,
) -> Result<RecordKey, sqlx::Error> {
    sqlx::query_scalar::<_, RecordKey>(
        r#"
        INSERT INTO battery_output_data (
            project_id,
            data_point_time,
            site,
            battery,
            load,
            solar,
            busway,
            frequency
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .bind(snapshot.data_point_time)
    .bind(Json(&snapshot.site))
    .bind(Json(&snapshot.battery))
    .bind(Json(&snapshot.load))
    .bind(Json(&snapshot.solar))
    .bind(Json(&snapshot.busway))
    .bind(Json(&snapshot.frequency))
    .fetch_one(pool)
    .await
}
