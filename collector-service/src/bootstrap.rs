//! Turns an [`AppConfig`] into a ready-to-run collector.
//!
//! Everything that can be checked before the first tick is checked here, so a
//! bad key, certificate or endpoint fails the process at startup instead of on
//! every cycle. The store is the exception: its pool connects lazily and an
//! outage surfaces as a failed cycle.

use std::{sync::Arc, time::Duration};

use crate::{
    config::{AppConfig, ConfigError},
    pipeline::{BrokerLink, CollectorCycle, Dispatcher, Scheduler},
    security::{
        build_tls_config, verify, CredentialError, CredentialMinter, SigningKey, TlsError,
        VerifyingKey,
    },
    sinks::{BrokerTransport, MqttConnector, MqttSettings, PostgresSnapshotStore, StoreError},
    sources::DevicePoller,
};

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load broker credentials: {0}")]
    Credential(#[from] CredentialError),
    #[error("signing key does not match the public key: {0}")]
    KeyPairMismatch(#[source] CredentialError),
    #[error("failed to build broker TLS configuration: {0}")]
    Tls(#[from] TlsError),
    #[error("failed to configure snapshot store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to build HTTP client for the device: {0}")]
    Http(#[from] reqwest::Error),
}

/// A fully wired collector: the per-tick cycle and the scheduler driving it.
pub struct Collector {
    pub cycle: CollectorCycle,
    pub scheduler: Scheduler,
}

pub fn build(cfg: &AppConfig) -> Result<Collector, StartupError> {
    let poller = DevicePoller::new(cfg.device.endpoint_url())?;
    let store = PostgresSnapshotStore::connect_lazy(&cfg.store, cfg.project.id.clone())?;

    let broker = if cfg.broker.enabled {
        Some(broker_link(cfg)?)
    } else {
        tracing::info!("broker disabled; running store-only");
        None
    };

    tracing::info!(
        project = %cfg.project.id,
        device = %poller.url(),
        interval_s = cfg.interval().as_secs(),
        broker = broker.is_some(),
        "collector configured"
    );

    Ok(Collector {
        cycle: CollectorCycle::new(
            poller,
            Arc::new(store),
            broker,
            Dispatcher::new(cfg.topic()),
            cfg.broker.leg_policy,
        ),
        scheduler: Scheduler::new(cfg.interval(), cfg.schedule.failure_policy),
    })
}

fn broker_link(cfg: &AppConfig) -> Result<BrokerLink, StartupError> {
    let signing = SigningKey::from_pem_file(&cfg.credentials.private_key)?;
    let verifying = VerifyingKey::from_pem_file(&cfg.credentials.public_key)?;
    let minter = CredentialMinter::new(signing, cfg.audience());
    check_key_pair(&minter, &verifying)?;

    let tls = build_tls_config(&cfg.broker.tls)?;
    let connector = MqttConnector::new(MqttSettings::from_config(cfg), BrokerTransport::Tls(tls));

    Ok(BrokerLink {
        connector: Arc::new(connector),
        minter,
        linger: Duration::from_millis(cfg.broker.disconnect_linger_ms),
    })
}

/// Mint a throwaway credential and verify it with the public key.
pub fn check_key_pair(minter: &CredentialMinter, verifying: &VerifyingKey) -> Result<(), StartupError> {
    let sample = minter.mint()?;
    verify(sample.token(), verifying, minter.audience()).map_err(StartupError::KeyPairMismatch)?;
    tracing::debug!(audience = %minter.audience(), "signing key verified against public key");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use std::{fs, path::Path};
    use tempfile::TempDir;

    const PRIVATE_PEM: &[u8] = include_bytes!("../tests/fixtures/rsa_private.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../tests/fixtures/rsa_public.pem");
    const OTHER_PUBLIC_PEM: &[u8] = include_bytes!("../tests/fixtures/other_public.pem");

    fn write_broker_files(dir: &Path, public_pem: &[u8]) {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let client_key = KeyPair::generate().unwrap();
        let client = CertificateParams::new(vec!["dev1".to_string()])
            .unwrap()
            .signed_by(&client_key, &ca, &ca_key)
            .unwrap();

        fs::write(dir.join("roots.pem"), ca.pem()).unwrap();
        fs::write(dir.join("client-crt.pem"), client.pem()).unwrap();
        fs::write(dir.join("client-key.pem"), client_key.serialize_pem()).unwrap();
        fs::write(dir.join("rsa_private.pem"), PRIVATE_PEM).unwrap();
        fs::write(dir.join("rsa_cert.pem"), public_pem).unwrap();
    }

    fn config(dir: &Path, broker_enabled: bool) -> AppConfig {
        let toml = format!(
            r#"
            [project]
            id = "powerchat-187002"

            [device]
            host = "127.0.0.1:9"

            [store]
            uri = "postgres://collector@127.0.0.1:5432/telemetry"

            [broker]
            enabled = {broker_enabled}

            [broker.tls]
            ca_cert = "{dir}/roots.pem"
            client_cert = "{dir}/client-crt.pem"
            client_key = "{dir}/client-key.pem"

            [credentials]
            private_key = "{dir}/rsa_private.pem"
            public_key = "{dir}/rsa_cert.pem"
            "#,
            dir = dir.display()
        );
        let cfg = AppConfig::from_toml(&toml).unwrap();
        cfg.validate().unwrap();
        cfg
    }

    fn workdir(public_pem: &[u8]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_broker_files(dir.path(), public_pem);
        dir
    }

    #[tokio::test]
    async fn builds_publishing_collector_from_valid_files() {
        let dir = workdir(PUBLIC_PEM);
        let collector = build(&config(dir.path(), true)).unwrap();
        assert_eq!(collector.scheduler.interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn mismatched_public_key_is_fatal() {
        let dir = workdir(OTHER_PUBLIC_PEM);
        let err = build(&config(dir.path(), true)).err().unwrap();
        assert!(matches!(err, StartupError::KeyPairMismatch(_)), "{err}");
    }

    #[tokio::test]
    async fn missing_private_key_is_fatal() {
        let dir = workdir(PUBLIC_PEM);
        fs::remove_file(dir.path().join("rsa_private.pem")).unwrap();
        let err = build(&config(dir.path(), true)).err().unwrap();
        assert!(matches!(err, StartupError::Credential(CredentialError::Read { .. })), "{err}");
    }

    #[tokio::test]
    async fn missing_client_certificate_is_fatal() {
        let dir = workdir(PUBLIC_PEM);
        fs::remove_file(dir.path().join("client-crt.pem")).unwrap();
        let err = build(&config(dir.path(), true)).err().unwrap();
        assert!(matches!(err, StartupError::Tls(_)), "{err}");
    }

    #[tokio::test]
    async fn store_only_collector_needs_no_broker_files() {
        let dir = tempfile::tempdir().unwrap();
        let collector = build(&config(dir.path(), false)).unwrap();
        assert_eq!(collector.scheduler.interval(), Duration::from_secs(5));
    }

    #[test]
    fn key_pair_check_accepts_matching_keys() {
        let minter = CredentialMinter::new(SigningKey::from_pem(PRIVATE_PEM).unwrap(), "p");
        let verifying = VerifyingKey::from_pem(PUBLIC_PEM).unwrap();
        assert!(check_key_pair(&minter, &verifying).is_ok());
    }
}
