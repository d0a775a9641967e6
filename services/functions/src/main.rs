use anyhow::{anyhow, Context, Result};
use linkkeeper_functions::{
    start_api_server, AppState, Config, GalleryStore, HttpAuthVerifier, InstagramImageExtractor,
    MetadataFetcher, ReqwestHttpClient, S3Uploader, TokioWaiter,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting LinkKeeper functions service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let gallery_store = Arc::new(
        GalleryStore::new(&config.database)
            .await
            .context("Failed to initialize gallery store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        gallery_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let s3_uploader = Arc::new(
        S3Uploader::new(&config.s3)
            .await
            .context("Failed to initialize S3 uploader")?,
    );

    let http = Arc::new(
        ReqwestHttpClient::new(config.http_timeout()).context("Failed to build HTTP client")?,
    );

    let auth = Arc::new(
        HttpAuthVerifier::new(&config.auth, config.http_timeout())
            .context("Failed to initialize auth verifier")?,
    );

    let metadata_fetcher = Arc::new(MetadataFetcher::new(
        http.clone(),
        config.http.oembed_endpoint.clone(),
        config.http.scraper_user_agent.clone(),
    ));

    let extractor = Arc::new(InstagramImageExtractor::new(
        http,
        s3_uploader,
        gallery_store.clone(),
        Arc::new(TokioWaiter),
        config.http.browser_user_agent.clone(),
        config.download_delay(),
    ));

    let api_state = AppState {
        metadata_fetcher,
        extractor,
        auth,
        record_store: gallery_store,
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let mut api_handle =
        tokio::spawn(async move { start_api_server(api_state, &api_config).await });

    info!("Functions service started successfully");

    // Run until a shutdown signal arrives or the API server exits on its own
    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutting down functions service");
            api_handle.abort();
            Ok(())
        }
        joined = &mut api_handle => match joined {
            Ok(Ok(())) => Err(anyhow!("API server exited unexpectedly")),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(anyhow!(e).context("API server task failed")),
        },
    };

    if let Err(e) = &outcome {
        error!(error = ?e, "API server error");
    }

    info!("Functions service stopped");

    outcome
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
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
