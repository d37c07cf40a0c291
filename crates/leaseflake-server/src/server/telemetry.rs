//! Structured logging and, optionally, a Prometheus-format `/metrics`
//! endpoint.
//!
//! Unlike a full distributed-tracing pipeline, this service's observability
//! surface is deliberately narrow: console logs via `tracing-subscriber`,
//! plus a handful of counters an external scraper can pull. There is no
//! OTLP exporter here - if a deployment needs one, it belongs in front of
//! this process, not inside it.

use portable_atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false),
        )
        .init();
}

static REQUESTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static ERRORS_TOTAL: AtomicU64 = AtomicU64::new(0);
static IDS_GENERATED_TOTAL: AtomicU64 = AtomicU64::new(0);

pub fn increment_requests() {
    REQUESTS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_errors() {
    ERRORS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_ids_generated() {
    IDS_GENERATED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Renders the current counters in Prometheus's text exposition format.
#[cfg(feature = "metrics")]
fn render() -> String {
    format!(
        "# HELP leaseflake_requests_total Total NextId requests received.\n\
         # TYPE leaseflake_requests_total counter\n\
         leaseflake_requests_total {}\n\
         # HELP leaseflake_errors_total Total NextId requests that returned an error.\n\
         # TYPE leaseflake_errors_total counter\n\
         leaseflake_errors_total {}\n\
         # HELP leaseflake_ids_generated_total Total ids successfully generated.\n\
         # TYPE leaseflake_ids_generated_total counter\n\
         leaseflake_ids_generated_total {}\n",
        REQUESTS_TOTAL.load(Ordering::Relaxed),
        ERRORS_TOTAL.load(Ordering::Relaxed),
        IDS_GENERATED_TOTAL.load(Ordering::Relaxed),
    )
}

#[cfg(feature = "metrics")]
pub async fn serve_metrics(addr: &str) -> anyhow::Result<()> {
    use axum::{Router, routing::get};

    let app = Router::new().route("/metrics", get(|| async { render() }));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Serving metrics on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
