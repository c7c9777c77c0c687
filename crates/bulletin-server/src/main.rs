mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bulletin_api::coordinator::Coordinator;
use bulletin_api::routes;
use bulletin_api::state::AppStateInner;
use bulletin_db::Database;
use bulletin_notify::fcm::{FcmProvider, ServiceAccountKey};
use bulletin_notify::provider::TracingProvider;
use bulletin_notify::{DeliveryProvider, NotificationDispatcher, WatermarkScanner};
use bulletin_types::repository::ContentRepository;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bulletin=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let repo: Arc<dyn ContentRepository> = Arc::new(db);

    let provider: Arc<dyn DeliveryProvider> = match &config.fcm_credentials {
        Some(path) => {
            let key = ServiceAccountKey::from_file(path)?;
            info!(project = %key.project_id, "Delivering notifications through FCM");
            Arc::new(FcmProvider::new(key, config.fcm_endpoint.clone())?)
        }
        None => {
            info!("BULLETIN_FCM_CREDENTIALS not set, notifications will only be logged");
            Arc::new(TracingProvider::new())
        }
    };
    let dispatcher = NotificationDispatcher::new(provider, config.retry, config.credential_lifetime);

    // Background scan for articles written outside the HTTP path
    let shutdown = CancellationToken::new();
    let scanner = WatermarkScanner::new(repo.clone(), dispatcher.clone(), config.topic.clone(), config.scan_interval);
    let scanner_task = tokio::spawn(scanner.run(shutdown.clone()));

    let state = Arc::new(AppStateInner {
        coordinator: Coordinator::new(repo, dispatcher, config.topic.clone()),
    });

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Bulletin server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    scanner_task.await?;
    info!("Bulletin server stopped");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
    shutdown.cancel();
}
