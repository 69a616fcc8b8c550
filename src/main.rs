//! Folio - Blog content, live chat and booking backend

use anyhow::Result;
use chrono::Utc;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio::{
    api::{self, AppState},
    config::Config,
    db,
    realtime::{spawn_alert_listener, spawn_sweeper},
};

/// How often expired typing indicators are swept
const TYPING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const PUBLISH_DUE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Folio v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    if config.admin.api_token.as_deref().unwrap_or_default().is_empty() {
        tracing::warn!("No admin API token configured, admin routes will reject every request");
    }

    let state = api::build_state(&config, pool)?;
    spawn_background_tasks(&state);

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn spawn_background_tasks(state: &AppState) {
    spawn_alert_listener(state.chat_service.hub(), state.chat_alert.clone());
    spawn_sweeper(
        state.chat_service.hub().clone(),
        state.typing.clone(),
        TYPING_SWEEP_INTERVAL,
    );

    // Rate limiter cleanup
    {
        let limiter = state.visitor_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    // Scheduled post publishing
    {
        let posts = state.post_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PUBLISH_DUE_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = posts.publish_due(Utc::now()).await {
                    tracing::error!("Failed to publish scheduled posts: {}", e);
                }
            }
        });
    }
}
