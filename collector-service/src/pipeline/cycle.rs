use std::{sync::Arc, time::Duration};

use super::{BrokerLegPolicy, CycleError, CycleReport, Dispatcher, PublishOutcome};
use crate::{
    security::CredentialMinter,
    sinks::{BrokerConnector, BrokerError, BrokerSession, SnapshotStore},
    sources::DevicePoller,
};

/// Everything needed to open one authenticated broker session.
pub struct BrokerLink {
    pub connector: Arc<dyn BrokerConnector>,
    pub minter: CredentialMinter,
    /// Upper bound on the graceful-disconnect wait.
    pub linger: Duration,
}

/// One connect → poll → dispatch → disconnect pass.
pub struct CollectorCycle {
    poller: DevicePoller,
    store: Arc<dyn SnapshotStore>,
    broker: Option<BrokerLink>,
    dispatcher: Dispatcher,
    leg_policy: BrokerLegPolicy,
}

impl CollectorCycle {
    pub fn new(
        poller: DevicePoller,
        store: Arc<dyn SnapshotStore>,
        broker: Option<BrokerLink>,
        dispatcher: Dispatcher,
        leg_policy: BrokerLegPolicy,
    ) -> Self {
        Self {
            poller,
            store,
            broker,
            dispatcher,
            leg_policy,
        }
    }

    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        let (mut session, connect_error) = match self.open_session().await {
            Ok(session) => (session, None),
            Err(e) if self.leg_policy == BrokerLegPolicy::BestEffort => {
                metrics::counter!("collector_broker_connect_errors_total").increment(1);
                tracing::warn!(error = %e, "broker unavailable; this cycle is store-only");
                (None, Some(e))
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = self
            .poll_and_dispatch(
                session.as_mut().map(|s| s.as_mut() as &mut dyn BrokerSession),
                connect_error,
            )
            .await;

        if let (Some(session), Some(link)) = (session, &self.broker) {
            session.close(link.linger).await;
        }
        outcome
    }

    /// Mint a fresh credential and connect. `None` for the store-only collector.
    async fn open_session(&self) -> Result<Option<Box<dyn BrokerSession>>, BrokerError> {
        let Some(link) = &self.broker else {
            return Ok(None);
        };
        let credential = link.minter.mint()?;
        link.connector.connect(&credential).await.map(Some)
    }

    async fn poll_and_dispatch(
        &self,
        session: Option<&mut dyn BrokerSession>,
        connect_error: Option<BrokerError>,
    ) -> Result<CycleReport, CycleError> {
        let snapshot = self.poller.poll().await.inspect_err(|e| {
            metrics::counter!("collector_poll_errors_total", "stage" => e.stage().to_string()).increment(1);
            if e.is_timeout() {
                metrics::counter!("collector_poll_timeouts_total").increment(1);
                tracing::warn!(url = %self.poller.url(), "device did not answer within the poll deadline");
            }
        })?;

        let mut dispatched = self
            .dispatcher
            .dispatch(&snapshot, self.store.as_ref(), session)
            .await;
        if let Some(e) = connect_error {
            dispatched.publish = PublishOutcome::ConnectFailed(e);
        }
        dispatched.into_cycle_result(self.leg_policy)
    }
}
