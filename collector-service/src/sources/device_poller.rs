use std::{fmt, time::Duration};

use reqwest::{Client, StatusCode};
use rust_client::domain::{DecodeError, TelemetrySnapshot};

/// Client-side deadline for one aggregates request.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStage {
    Connect,
    Status,
    Read,
    Decode,
}

impl fmt::Display for PollStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PollStage::Connect => "connect",
            PollStage::Status => "status",
            PollStage::Read => "read",
            PollStage::Decode => "decode",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("request to {url} failed: {source}")]
    Connect { url: String, source: reqwest::Error },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("failed to read body from {url}: {source}")]
    Read { url: String, source: reqwest::Error },
    #[error("undecodable aggregates from {url}: {source}")]
    Decode { url: String, source: DecodeError },
}

impl PollError {
    pub fn stage(&self) -> PollStage {
        match self {
            PollError::Connect { .. } => PollStage::Connect,
            PollError::Status { .. } => PollStage::Status,
            PollError::Read { .. } => PollStage::Read,
            PollError::Decode { .. } => PollStage::Decode,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            PollError::Connect { source, .. } | PollError::Read { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Fetches one aggregates snapshot per call from the device's local API.
#[derive(Debug, Clone)]
pub struct DevicePoller {
    url: String,
    client: Client,
}

impl DevicePoller {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(url, POLL_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single GET, no retry. The returned snapshot is stamped with the local
    /// time at which decoding finished.
    pub async fn poll(&self) -> Result<TelemetrySnapshot, PollError> {
        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| PollError::Connect {
                url: self.url.clone(),
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            return Err(PollError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = res.bytes().await.map_err(|source| PollError::Read {
            url: self.url.clone(),
            source,
        })?;

        let snapshot = TelemetrySnapshot::decode(&body).map_err(|source| PollError::Decode {
            url: self.url.clone(),
            source,
        })?;

        tracing::debug!(
            url = %self.url,
            bytes = body.len(),
            solar_w = snapshot.solar.instant_power,
            "polled device aggregates"
        );
        Ok(snapshot)
    }
}
