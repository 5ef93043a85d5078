use rust_client::db::RecordKey;
use serde::Deserialize;

use crate::{
    sinks::{BrokerError, StoreError},
    sources::{PollError, PollStage},
};

pub mod cycle;
pub mod dispatcher;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use cycle::{BrokerLink, CollectorCycle};
pub use dispatcher::{DispatchResult, Dispatcher, PublishOutcome};
pub use scheduler::{CycleRunner, Scheduler};

/// What the scheduler does when a cycle fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and wait for the next tick.
    #[default]
    SkipCycle,
    /// Stop the scheduler and exit non-zero.
    Terminate,
}

/// Whether a failed broker leg fails the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerLegPolicy {
    /// Broker connect or publish failures are logged; the cycle still succeeds
    /// once the store write did.
    #[default]
    BestEffort,
    Required,
}

#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl CycleError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Poll(e) if e.stage() == PollStage::Decode => "decode",
            CycleError::Poll(_) => "fetch",
            CycleError::Store(_) => "store",
            CycleError::Broker(_) => "broker",
        }
    }
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub key: RecordKey,
    pub published: bool,
    pub summary: String,
    /// Broker failure tolerated under [`BrokerLegPolicy::BestEffort`].
    pub publish_error: Option<String>,
}
