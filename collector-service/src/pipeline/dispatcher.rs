use rust_client::{db::RecordKey, domain::TelemetrySnapshot};

use super::{BrokerLegPolicy, CycleError, CycleReport};
use crate::{
    sinks::{BrokerError, BrokerSession, SnapshotStore, StoreError},
    transform::solar_summary,
};

#[derive(Debug)]
pub enum PublishOutcome {
    Published,
    Failed(BrokerError),
    /// No session could be opened this cycle, so nothing was sent.
    ConnectFailed(BrokerError),
    /// The store write failed, so the summary was never sent.
    NotAttempted,
    /// Store-only collector: there is no broker leg.
    Skipped,
}

/// Per-sink outcome of one dispatch. Each leg keeps its own result.
#[derive(Debug)]
pub struct DispatchResult {
    pub store: Result<RecordKey, StoreError>,
    pub publish: PublishOutcome,
    pub summary: String,
}

impl DispatchResult {
    /// Collapse into a cycle outcome. A store failure always fails the cycle;
    /// a publish failure only does under [`BrokerLegPolicy::Required`].
    pub fn into_cycle_result(self, policy: BrokerLegPolicy) -> Result<CycleReport, CycleError> {
        let key = self.store?;
        let (published, publish_error) = match self.publish {
            PublishOutcome::Published => (true, None),
            PublishOutcome::Failed(e) | PublishOutcome::ConnectFailed(e) => match policy {
                BrokerLegPolicy::Required => return Err(e.into()),
                BrokerLegPolicy::BestEffort => {
                    tracing::warn!(key, error = %e, "summary not published; snapshot was stored");
                    (false, Some(e.to_string()))
                }
            },
            PublishOutcome::NotAttempted | PublishOutcome::Skipped => (false, None),
        };

        Ok(CycleReport {
            key,
            published,
            summary: self.summary,
            publish_error,
        })
    }
}

/// Delivers a snapshot to the store and its summary to the broker, in that
/// order, with no shared transaction between the two.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    topic: String,
}

impl Dispatcher {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn dispatch(
        &self,
        snapshot: &TelemetrySnapshot,
        store: &dyn SnapshotStore,
        broker: Option<&mut dyn BrokerSession>,
    ) -> DispatchResult {
        let summary = solar_summary(snapshot);
        let stored = store.insert(snapshot).await;

        let publish = match (&stored, broker) {
            (Err(e), _) => {
                tracing::warn!(error = %e, "store write failed; publish not attempted");
                PublishOutcome::NotAttempted
            }
            (Ok(_), None) => PublishOutcome::Skipped,
            (Ok(_), Some(session)) => {
                tracing::info!(topic = %self.topic, %summary, "publishing summary");
                match session.publish(&self.topic, &summary).await {
                    Ok(()) => {
                        metrics::counter!("collector_publish_total").increment(1);
                        PublishOutcome::Published
                    }
                    Err(e) => {
                        metrics::counter!("collector_publish_errors_total").increment(1);
                        PublishOutcome::Failed(e)
                    }
                }
            }
        };

        DispatchResult {
            store: stored,
            publish,
            summary,
        }
    }
}
