use std::time::{Duration, Instant};

use rust_client::{
    db::{insert_snapshot, RecordKey},
    domain::{TelemetrySnapshot, SNAPSHOT_KIND},
};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{SnapshotStore, StoreError};
use crate::config::StoreConfig;

pub struct PostgresSnapshotStore {
    pool: PgPool,
    project_id: String,
    write_timeout: Duration,
}

impl PostgresSnapshotStore {
    pub fn new(pool: PgPool, project_id: impl Into<String>, write_timeout: Duration) -> Self {
        Self {
            pool,
            project_id: project_id.into(),
            write_timeout,
        }
    }

    /// Build a pool that connects on first use, so an unreachable store
    /// fails a cycle rather than startup.
    pub fn connect_lazy(cfg: &StoreConfig, project_id: impl Into<String>) -> Result<Self, StoreError> {
        let write_timeout = Duration::from_millis(cfg.write_timeout_ms);
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(write_timeout)
            .connect_lazy(&cfg.uri)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self::new(pool, project_id, write_timeout))
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn insert(&self, snapshot: &TelemetrySnapshot) -> Result<RecordKey, StoreError> {
        let started = Instant::now();
        let write = insert_snapshot(&self.pool, &self.project_id, snapshot);

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(key)) => {
                metrics::counter!("collector_store_writes_total").increment(1);
                metrics::histogram!("collector_store_write_seconds").record(started.elapsed().as_secs_f64());
                tracing::debug!(kind = SNAPSHOT_KIND, key, "snapshot stored");
                Ok(key)
            }
            Ok(Err(e)) => {
                metrics::counter!("collector_store_errors_total").increment(1);
                Err(StoreError::Write(e))
            }
            Err(_) => {
                metrics::counter!("collector_store_errors_total").increment(1);
                Err(StoreError::Timeout(self.write_timeout))
            }
        }
    }
}
