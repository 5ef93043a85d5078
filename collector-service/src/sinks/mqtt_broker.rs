use std::{sync::Arc, time::Duration};

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, TlsConfiguration, Transport,
};

use super::{BrokerConnector, BrokerError, BrokerSession};
use crate::{config::AppConfig, security::Credential};

/// The broker authenticates with the JWT password; the user name is ignored.
pub const MQTT_USERNAME: &str = "unused";

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
}

impl MqttSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            host: cfg.broker.host.clone(),
            port: cfg.broker.port,
            client_id: cfg.client_id(),
            keep_alive: Duration::from_secs(cfg.broker.keep_alive_secs),
            connect_timeout: Duration::from_millis(cfg.broker.connect_timeout_ms),
            publish_timeout: Duration::from_millis(cfg.broker.publish_timeout_ms),
        }
    }
}

#[derive(Clone)]
pub enum BrokerTransport {
    Tls(Arc<rustls::ClientConfig>),
    /// Plain TCP; only for local test brokers.
    Tcp,
}

pub struct MqttConnector {
    settings: MqttSettings,
    transport: BrokerTransport,
}

impl MqttConnector {
    pub fn new(settings: MqttSettings, transport: BrokerTransport) -> Self {
        Self {
            settings,
            transport,
        }
    }

    fn options(&self, credential: &Credential) -> MqttOptions {
        let s = &self.settings;
        let mut opts = MqttOptions::new(s.client_id.clone(), s.host.clone(), s.port);
        opts.set_credentials(MQTT_USERNAME, credential.token().to_string());
        opts.set_keep_alive(s.keep_alive);
        opts.set_clean_session(true);
        if let BrokerTransport::Tls(tls) = &self.transport {
            opts.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(tls.clone())));
        }
        opts
    }
}

#[async_trait::async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn BrokerSession>, BrokerError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(credential), 10);

        let timeout = self.settings.connect_timeout;
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| BrokerError::ConnectTimeout(timeout))??;

        tracing::debug!(
            host = %self.settings.host,
            port = self.settings.port,
            client_id = %self.settings.client_id,
            expires_at = credential.expires_at(),
            "broker session established"
        );

        Ok(Box::new(MqttSession {
            client,
            eventloop,
            publish_timeout: self.settings.publish_timeout,
        }))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BrokerError::Refused(format!("{code:?}"))),
                };
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(BrokerError::Refused(format!("{code:?}")));
            }
            Err(e) => return Err(BrokerError::Connect(e)),
        }
    }
}

struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    publish_timeout: Duration,
}

impl MqttSession {
    async fn drive_until_sent(&mut self) -> Result<(), BrokerError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Publish(_))) => return Ok(()),
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    tracing::debug!(
                        topic = %msg.topic,
                        payload = %String::from_utf8_lossy(&msg.payload),
                        "message from broker"
                    );
                }
                Ok(_) => {}
                Err(e) => return Err(BrokerError::Disconnected(e.to_string())),
            }
        }
    }
}

#[async_trait::async_trait]
impl BrokerSession for MqttSession {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.to_owned())
            .await
            .map_err(BrokerError::Publish)?;

        let timeout = self.publish_timeout;
        tokio::time::timeout(timeout, self.drive_until_sent())
            .await
            .map_err(|_| BrokerError::PublishTimeout(timeout))?
    }

    async fn close(mut self: Box<Self>, linger: Duration) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "disconnect request not queued");
            return;
        }

        let flushed = tokio::time::timeout(linger, async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if flushed.is_err() {
            tracing::debug!(?linger, "broker disconnect did not flush within linger");
        }
    }
}
