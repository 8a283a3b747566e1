use std::process;

use server_side_cache::{
    application::error::AppError,
    cache::{CacheConfig, ResponseCache, RouteCacheConfig},
    config::{self, Settings},
    infra::{error::InfraError, http, store::open_store, telemetry},
};
use tokio::net::TcpListener;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    serve(settings).await
}

async fn serve(settings: Settings) -> Result<(), AppError> {
    let store = open_store(&settings.cache)?;
    let cache = ResponseCache::new(store, CacheConfig::from(&settings.cache));
    let route = cache
        .route(RouteCacheConfig::from(&settings.cache.route))
        .map_err(InfraError::from)?;
    let router = http::build_router(route);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        addr = %settings.server.addr,
        store = %settings.cache.store_url,
        ttl_seconds = settings.cache.ttl_seconds.get(),
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InfraError::from)?;

    let grace = settings.server.graceful_shutdown;
    if tokio::time::timeout(grace, cache.close()).await.is_err() {
        warn!(
            timeout_secs = grace.as_secs(),
            "pending cache writes did not finish before shutdown"
        );
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
