mod server;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use leaseflake::{
    Composer, ConsulBackend, ConsulBackendConfig, LeasedProvider, LeasedProviderConfig,
    StaticProvider, SystemClock, WorkerIdProvider,
};
use leaseflake_proto::proto::{FILE_DESCRIPTOR_SET, id_generator_server::IdGeneratorServer};
use server::config::{CliArgs, ProviderKind, ServerConfig};
use server::service::handler::{IdService, set_global_shutdown};
use tokio::net::TcpListener;
use tokio::signal;
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    server::telemetry::init_logging();

    #[cfg(feature = "metrics")]
    {
        let addr = config.metrics_addr();
        tokio::spawn(async move {
            if let Err(err) = server::telemetry::serve_metrics(&addr).await {
                tracing::error!("metrics server exited: {err:?}");
            }
        });
    }

    let provider = build_provider(&config)?;
    let composer = Arc::new(Composer::new(
        config.datacenter_id,
        Arc::new(SystemClock),
        provider,
    )?);

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<IdGeneratorServer<IdService>>()
        .await;

    let service = IdService::new(composer);

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let server_addr = config.server_addr();
    let listener = TcpListener::bind(&server_addr).await?;
    tracing::info!("Starting leaseflake-server on {server_addr}");

    Server::builder()
        .add_service(health_service)
        .add_service(reflection)
        .add_service(IdGeneratorServer::new(service))
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            shutdown_signal(health_reporter, config.shutdown_timeout),
        )
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

/// Builds the [`WorkerIdProvider`] this process uses, per `--provider`: a
/// fixed id (`simple`) or a lease negotiated over the consensus KV
/// (`consul`).
fn build_provider(config: &ServerConfig) -> anyhow::Result<Arc<dyn WorkerIdProvider>> {
    match config.provider {
        ProviderKind::Simple => {
            tracing::info!("Using static worker id {}", config.worker_id);
            Ok(Arc::new(StaticProvider::new(config.worker_id)?))
        }
        ProviderKind::Consul => {
            tracing::info!(
                "Leasing a worker id from Consul at {}",
                config.consul_address
            );
            let backend = Arc::new(ConsulBackend::new(ConsulBackendConfig {
                base_url: config.consul_address.clone(),
                session_ttl: Duration::from_secs(config.consul_session_ttl_secs),
                request_timeout: Duration::from_secs(10),
            })?);

            let lease_config = LeasedProviderConfig {
                key_prefix: config.consul_key_prefix.clone(),
                scan_hint: config.hint_worker_id,
                preserve_on_loss: config.enable_self_preservation,
                renew_interval: Duration::from_secs(config.consul_session_ttl_secs / 3 + 1),
                ..LeasedProviderConfig::default()
            };
            Ok(LeasedProvider::spawn(backend, lease_config))
        }
    }
}

async fn shutdown_signal(health_reporter: HealthReporter, shutdown_timeout: u64) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    set_global_shutdown();
    health_reporter
        .set_not_serving::<IdGeneratorServer<IdService>>()
        .await;

    // Give in-flight requests a grace window to finish before tonic stops
    // accepting new connections and tears the listener down.
    tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
}
