//! Gatherly - group activity planner

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatherly::{
    api::{self, AppState, RequestStats},
    config::Config,
    db::{self, repositories::SqlxMessageRepository},
    llm,
    notify::{self, Notifier},
    services::{ConversationRateLimiter, Services},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatherly=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gatherly...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");
    config.log_integrations();

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let services = Services::new(pool.clone(), llm::create_client(&config.llm));
    let notifier = Notifier::new(
        notify::create_sms_sender(&config.sms),
        notify::create_email_sender(&config.email),
        SqlxMessageRepository::boxed(pool.clone()),
        &config.server.public_url,
    );
    let limiter = Arc::new(ConversationRateLimiter::from_config(&config.planner));

    let state = AppState {
        pool,
        services,
        notifier: Arc::new(notifier),
        limiter: limiter.clone(),
        request_stats: Arc::new(RequestStats::new()),
    };

    // Start rate limiter cleanup task (runs every 5 minutes)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
