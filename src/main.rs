use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use tenant_onboard::clock::SystemClock;
use tenant_onboard::config::OnboardingConfig;
use tenant_onboard::onboarding::{
    Collaborators, OnboardingManager, OnboardingRouteState, onboarding_routes,
    spawn_session_sweeper,
};
use tenant_onboard::services::{HttpBackend, MockBackend};
use tenant_onboard::store::libsql_backend::DEFAULT_SCOPE;
use tenant_onboard::store::{KeyValueStore, LibSqlStore, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing();

    let config = OnboardingConfig::from_env();

    eprintln!("Tenant Onboard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding", config.port);
    eprintln!("   Domain suffix: {}", config.domain_suffix);

    // ── Store ────────────────────────────────────────────────────────────
    let store: Arc<dyn KeyValueStore> = match config.db_path.as_deref() {
        Some(path) => {
            let store = LibSqlStore::new_local(std::path::Path::new(path), DEFAULT_SCOPE)
                .await
                .with_context(|| format!("opening database at {path}"))?;
            eprintln!("   Store: {path}");
            Arc::new(store)
        }
        None => {
            eprintln!("   Store: in-memory");
            Arc::new(MemoryStore::new())
        }
    };

    // ── Backend ──────────────────────────────────────────────────────────
    let services = match config.backend_url.as_deref() {
        Some(url) => {
            let backend = HttpBackend::new(url).context("building HTTP backend client")?;
            eprintln!("   Backend: {url}");
            Collaborators::from_backend(Arc::new(backend))
        }
        None => {
            eprintln!("   Backend: mock (OTP code 123456)");
            Collaborators::from_backend(Arc::new(MockBackend::new(&config.domain_suffix)))
        }
    };

    let port = config.port;
    let manager = Arc::new(OnboardingManager::new(
        config,
        services,
        store,
        Arc::new(SystemClock),
    ));

    let sweeper = spawn_session_sweeper(manager.clone(), Duration::from_secs(60));

    let app = onboarding_routes(OnboardingRouteState { manager })
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("binding port {port}"))?;
    tracing::info!(port, "Onboarding server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("serving onboarding API")?;

    sweeper.abort();

    Ok(())
}

/// Stderr logging, plus a daily rolling file when `ONBOARD_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("ONBOARD_LOG_DIR") {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "tenant-onboard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}
