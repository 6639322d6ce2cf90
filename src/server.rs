use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::{
    Res, api,
    config::ServiceConfig,
    executor::DownloadExecutor,
    management::{ExpiryScheduler, JobRegistry},
    orchestrator::{Orchestrator, PipelineSettings},
    sources::SourceLocator,
    spotify::SpotifyClient,
};

/// Everything the request handlers share.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub http: Client,
    pub config: Arc<ServiceConfig>,
}

/// Wires the production components together. Must run inside a Tokio
/// runtime: the expiry sweeper is spawned here and stops when `shutdown` is
/// cancelled.
pub fn build_state(config: ServiceConfig, shutdown: CancellationToken) -> Res<(AppState, JoinHandle<()>)> {
    let http = Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let registry = Arc::new(JobRegistry::new());
    let (expiry, sweeper) = ExpiryScheduler::spawn(Arc::clone(&registry), shutdown);
    let metadata = Arc::new(SpotifyClient::new(http.clone(), &config));
    let locator = Arc::new(SourceLocator::from_config(&config, http.clone()));
    let executor = Arc::new(DownloadExecutor::from_config(&config));

    let orchestrator = Orchestrator::new(
        registry,
        metadata,
        locator,
        executor,
        expiry,
        PipelineSettings::from(&config),
    );

    let state = AppState {
        orchestrator,
        http,
        config: Arc::new(config),
    };
    Ok((state, sweeper))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(api::ping))
        .route("/token", post(api::token))
        .route("/refresh", post(api::refresh))
        .route("/download/start", post(api::start_download))
        .route("/download/status/{job_id}", get(api::download_status))
        .route("/download/file/{job_id}", get(api::download_file))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API until Ctrl-C, then stops the expiry sweeper, which purges
/// every staged file still waiting to expire.
pub async fn start_api_server(config: ServiceConfig) -> Res<()> {
    let addr = SocketAddr::from_str(&config.server_addr)?;
    let shutdown = CancellationToken::new();

    tracing::info!(
        staging_dir = %config.staging_dir.display(),
        providers = ?config.source_providers,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "starting download service"
    );
    if config.spotify_client_id.is_none() || config.spotify_client_secret.is_none() {
        tracing::warn!("Spotify credentials are not configured, every job will fail at lookup");
    }

    let (state, sweeper) = build_state(config, shutdown.clone())?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    let signal = shutdown.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
                _ = signal.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}
