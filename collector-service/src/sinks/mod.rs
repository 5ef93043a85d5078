use std::time::Duration;

use rust_client::{db::RecordKey, domain::TelemetrySnapshot};

use crate::security::{Credential, CredentialError};

pub mod mqtt_broker;
pub mod postgres_store;

pub use mqtt_broker::{BrokerTransport, MqttConnector, MqttSettings};
pub use postgres_store::PostgresSnapshotStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store write timed out after {0:?}")]
    Timeout(Duration),
    #[error("store write failed: {0}")]
    Write(#[source] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("failed to mint broker credential: {0}")]
    Credential(#[from] CredentialError),
    #[error("broker connection failed: {0}")]
    Connect(#[source] rumqttc::ConnectionError),
    #[error("broker refused connection: {0}")]
    Refused(String),
    #[error("broker did not acknowledge connection within {0:?}")]
    ConnectTimeout(Duration),
    #[error("failed to queue publish: {0}")]
    Publish(#[source] rumqttc::ClientError),
    #[error("publish not sent within {0:?}")]
    PublishTimeout(Duration),
    #[error("broker connection lost: {0}")]
    Disconnected(String),
}

/// Durable, write-only snapshot store. Every call appends a new record under
/// a key chosen by the store.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn insert(&self, snapshot: &TelemetrySnapshot) -> Result<RecordKey, StoreError>;
}

/// Opens one authenticated broker session per cycle.
#[async_trait::async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn BrokerSession>, BrokerError>;
}

#[async_trait::async_trait]
pub trait BrokerSession: Send {
    /// Publish at most once, not retained. Resolves once the message has been
    /// handed to the connection.
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError>;

    /// Disconnect, waiting at most `linger` for in-flight packets to flush.
    async fn close(self: Box<Self>, linger: Duration);
}
