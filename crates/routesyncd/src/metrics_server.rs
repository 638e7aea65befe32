//! HTTP metrics server for Prometheus scraping
//!
//! Serves plain HTTP on the IPv6 loopback only.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-6: Audit Record Review - Metrics endpoint for analysis
//! - SI-4: System Monitoring - HTTP endpoint for monitoring systems
//! - SC-7: Boundary Protection - Bound to loopback

use crate::error::Result;
use crate::metrics::MetricsCollector;
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use prometheus::{Encoder, TextEncoder};
use std::net::{Ipv6Addr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Default metrics server port
pub const DEFAULT_METRICS_PORT: u16 = 9093;

#[derive(Clone)]
struct MetricsServerState {
    collector: MetricsCollector,
}

fn router(collector: MetricsCollector) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(MetricsServerState { collector })
}

/// Serve `/metrics` and `/health` on `[::1]:port` until `shutdown` fires
pub async fn start_metrics_server(
    collector: MetricsCollector,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from((Ipv6Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting metrics server on http://[::1]:{}/metrics", port);

    axum::serve(listener, router(collector))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Handle /metrics endpoint - Prometheus text format
async fn metrics_handler(State(state): State<MetricsServerState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.collector.registry.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

/// Handle /health endpoint - healthy while the synchronizer runs
async fn health_handler(State(state): State<MetricsServerState>) -> impl IntoResponse {
    let (code, status) = if state.collector.running.get() == 1 {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let body = format!(r#"{{"status": "{}"}}"#, status);
    (code, [("content-type", "application/json")], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_follows_running_gauge() {
        let collector = MetricsCollector::new().unwrap();
        let state = MetricsServerState {
            collector: collector.clone(),
        };

        let response = health_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        collector.set_running(true);
        let response = health_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_handler_ok() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_update();

        let response = metrics_handler(State(MetricsServerState { collector }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_serves_metrics() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let collector = MetricsCollector::new().unwrap();
        collector.record_route_added();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                axum::serve(listener, router(collector))
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("routesyncd_routes_added_total 1"));

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
