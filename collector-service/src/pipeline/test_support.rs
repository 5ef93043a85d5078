use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use rust_client::{db::RecordKey, domain::TelemetrySnapshot};

use crate::{
    security::Credential,
    sinks::{BrokerConnector, BrokerError, BrokerSession, SnapshotStore, StoreError},
};

/// Append-only in-memory store with an outage switch.
#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<Vec<(RecordKey, TelemetrySnapshot)>>,
    next_key: AtomicI64,
    down: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn failing() -> Self {
        let store = Self::default();
        store.down.store(true, Ordering::SeqCst);
        store
    }

    pub(crate) fn records(&self) -> Vec<(RecordKey, TelemetrySnapshot)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn insert(&self, snapshot: &TelemetrySnapshot) -> Result<RecordKey, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        let key = self.next_key.fetch_add(1, Ordering::SeqCst) + 1;
        self.records.lock().unwrap().push((key, snapshot.clone()));
        Ok(key)
    }
}

#[derive(Default)]
pub(crate) struct BrokerLog {
    pub(crate) credentials: Vec<Credential>,
    pub(crate) published: Vec<(String, String)>,
    pub(crate) closed: usize,
}

pub(crate) struct FakeSession {
    log: Arc<Mutex<BrokerLog>>,
    fail_publish: bool,
}

impl FakeSession {
    pub(crate) fn new(log: Arc<Mutex<BrokerLog>>, fail_publish: bool) -> Self {
        Self { log, fail_publish }
    }
}

#[async_trait::async_trait]
impl BrokerSession for FakeSession {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        if self.fail_publish {
            return Err(BrokerError::PublishTimeout(Duration::from_secs(5)));
        }
        self.log
            .lock()
            .unwrap()
            .published
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    async fn close(self: Box<Self>, _linger: Duration) {
        self.log.lock().unwrap().closed += 1;
    }
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    pub(crate) log: Arc<Mutex<BrokerLog>>,
    pub(crate) refuse: bool,
    pub(crate) fail_publish: bool,
}

#[async_trait::async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn BrokerSession>, BrokerError> {
        self.log.lock().unwrap().credentials.push(credential.clone());
        if self.refuse {
            return Err(BrokerError::Refused("NotAuthorized".to_string()));
        }
        Ok(Box::new(FakeSession::new(self.log.clone(), self.fail_publish)))
    }
}
