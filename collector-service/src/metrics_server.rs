use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(thiserror::Error, Debug)]
pub enum MetricsServerError {
    #[error("invalid metrics bind address {addr}: {source}")]
    BindAddr {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("failed to install Prometheus recorder: {0}")]
    Recorder(#[from] metrics_exporter_prometheus::BuildError),
}

/// Install the Prometheus recorder and serve `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> Result<(), MetricsServerError> {
    let addr: SocketAddr = bind_addr.parse().map_err(|source| MetricsServerError::BindAddr {
        addr: bind_addr.to_string(),
        source,
    })?;

    let handle = PrometheusBuilder::new().install_recorder()?;
    // Only the first call wins; later calls would have failed above anyway.
    let _ = PROM_HANDLE.set(handle);

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics endpoint listening");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, %addr, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparsable_bind_address_before_installing_recorder() {
        let err = init("localhost:metrics").unwrap_err();
        assert!(matches!(err, MetricsServerError::BindAddr { .. }));
        assert!(PROM_HANDLE.get().is_none());
    }
}
