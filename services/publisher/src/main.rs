use anyhow::{Context, Result};
use publish_service::config::{Config, ServiceConfig};
use publish_service::controller::{run_controller, spawn_operator_input};
use publish_service::object_store::S3ObjectStore;
use publish_service::server::{self, AppState};
use publish_service::{Publisher, Verifier, VideoState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    config.validate().context("Invalid configuration")?;

    info!(
        service = %config.service.name,
        source = %config.publish.source_file,
        close_response_body = config.publish.close_response_body,
        "Starting publish service"
    );

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    let video = VideoState::new(config.server.placeholder_url.clone());

    let store = Arc::new(
        S3ObjectStore::new(&config.storage)
            .await
            .context("Failed to initialize object store")?,
    );

    let verifier = Verifier::new(config.publish.close_response_body, config.verify_timeout())?;

    let publisher = Publisher::new(
        store,
        verifier,
        video.clone(),
        &config.publish.source_file,
        config.storage.clone(),
        config.propagation_delay(),
    );

    // The server cannot do its job without a listener, so a bind failure ends the process.
    let listener = server::bind(&config.server.listen_address).await?;
    let router = server::create_router(AppState {
        video,
        index_file: Arc::new(PathBuf::from(&config.server.index_file)),
        service_name: Arc::from(config.service.name.as_str()),
    });

    let shutdown = CancellationToken::new();
    let server_handle = tokio::spawn(server::serve(
        listener,
        router,
        shutdown.clone(),
        config.shutdown_grace(),
    ));

    println!(
        "Server is running. Open http://{} in your browser",
        config.server.listen_address
    );
    println!("\nPress Enter to upload {}, or Ctrl+C to exit...", publisher.source_file().display());

    let exit = run_controller(&publisher, spawn_operator_input(), shutdown_signal()).await;
    info!(?exit, "Controller stopped");

    info!("Shutting down publish service");
    shutdown.cancel();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    info!("Publish service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(service: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&service.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if service.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
