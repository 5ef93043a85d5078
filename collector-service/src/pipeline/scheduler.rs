use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{CollectorCycle, CycleError, CycleReport, FailurePolicy};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Cadence of the store-only collector.
pub const STORE_ONLY_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait::async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport, CycleError>;
}

#[async_trait::async_trait]
impl CycleRunner for CollectorCycle {
    async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.run_once().await
    }
}

/// Fixed-rate driver. Ticks sit on a grid of `interval` anchored at start-up;
/// the first cycle runs one interval after [`Scheduler::run`] is called.
/// Cycles never overlap, and ticks missed while a cycle overran are dropped.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    policy: FailurePolicy,
}

impl Scheduler {
    pub fn new(interval: Duration, policy: FailurePolicy) -> Self {
        Self { interval, policy }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs until `shutdown` is cancelled (returns `Ok`) or, under
    /// [`FailurePolicy::Terminate`], until the first failed cycle.
    pub async fn run<R>(&self, runner: &R, shutdown: CancellationToken) -> Result<(), CycleError>
    where
        R: CycleRunner + ?Sized,
    {
        let mut next_tick = Instant::now() + self.interval;
        tracing::info!(interval_s = self.interval.as_secs_f64(), policy = ?self.policy, "scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested; scheduler stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep_until(next_tick) => {}
            }

            let started = Instant::now();
            let started_at = OffsetDateTime::now_utc();
            let result = runner.run_cycle().await;
            let elapsed = started.elapsed();

            metrics::counter!("collector_cycles_total").increment(1);
            metrics::histogram!("collector_cycle_duration_seconds").record(elapsed.as_secs_f64());

            match result {
                Ok(report) => tracing::info!(
                    key = report.key,
                    published = report.published,
                    summary = %report.summary,
                    publish_error = report.publish_error.as_deref(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "cycle complete"
                ),
                Err(e) => {
                    metrics::counter!("collector_cycle_failures_total", "stage" => e.kind()).increment(1);
                    tracing::error!(stage = e.kind(), error = %e, started_at = %started_at, "cycle failed");
                    if self.policy == FailurePolicy::Terminate {
                        return Err(e);
                    }
                }
            }

            next_tick += self.interval;
            let now = Instant::now();
            if next_tick < now {
                let behind = now - next_tick;
                let skipped = behind.as_nanos() / self.interval.as_nanos() + 1;
                next_tick += self.interval * skipped as u32;
                tracing::warn!(skipped = skipped as u64, ?elapsed, "cycle overran its interval; skipping missed ticks");
            }
        }
    }
}
