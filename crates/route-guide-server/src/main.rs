#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use futures::Stream;
use route_guide_core::proto::route_guide_server::RouteGuideServer;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::RouteGuideService;
use server::store::FeatureStore;
use server::telemetry::{TelemetryProviders, init_telemetry};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let store = match FeatureStore::open(config.db_path.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to load feature database: {e}");
            providers.shutdown();
            return Err(e.into());
        }
    };

    let tcp = TcpListener::bind(&config.server_addr).await?;
    let incoming = TcpListenerStream::new(tcp);
    log_startup_info(&config, &store);
    run_server_with_incoming(providers, incoming, store, config).await
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    store: FeatureStore,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<RouteGuideServer<RouteGuideService>>()
        .await;

    let service = RouteGuideService::new(store, config);

    Server::builder()
        .http2_adaptive_window(Some(true))
        .add_service(health_service)
        .add_service(build_route_guide_service(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(service, health_reporter, providers),
        )
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig, store: &FeatureStore) {
    if cfg!(debug_assertions) {
        let named = store.all().iter().filter(|f| f.is_named()).count();
        tracing::info!(
            "Starting route guide on {} with {} features ({} named) and full config: {:#?}",
            config.server_addr,
            store.len(),
            named,
            config
        );
    } else {
        tracing::info!(
            "Starting route guide on {} with {} features, one every {:?}",
            config.server_addr,
            store.len(),
            config.send_interval
        );
    }
}

fn build_route_guide_service(service: RouteGuideService) -> RouteGuideServer<RouteGuideService> {
    RouteGuideServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal(
    service: RouteGuideService,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<RouteGuideServer<RouteGuideService>>()
        .await;

    // 2. Drain, then cancel, in-flight streams
    let remaining = service.shutdown().await;
    if remaining > 0 {
        tracing::error!("{remaining} streams still running at shutdown");
    }

    // 3. Flush exporters
    providers.shutdown();
}
