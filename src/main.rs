//! Biblio Server - library catalog and loans
//!
//! REST API server for a small lending library.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::Request, ServiceExt};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use biblio_server::{
    api,
    cli::{Cli, Command},
    clock::SystemClock,
    config::AppConfig,
    repository::Repository,
    services::{redis::RedisService, tokens::InMemoryBlacklist, tokens::TokenBlacklist, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config);

    let services = build_services(&config).await?;

    match cli.command() {
        Command::Serve => serve(config, services).await,
        Command::CreateSuperuser {
            username,
            email,
            password,
        } => {
            let user = services
                .auth
                .create_superuser(username, email, &password)
                .await
                .context("Failed to create superuser")?;
            println!("Superuser '{}' created (id {})", user.username, user.id);
            Ok(())
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("biblio_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wire storage, revocation list and services for the configured backend
async fn build_services(config: &AppConfig) -> anyhow::Result<Services> {
    let (repository, blacklist): (Repository, Arc<dyn TokenBlacklist>) = if config.database.in_memory {
        tracing::warn!("Using in-memory storage, data is lost on shutdown");
        (Repository::in_memory(), Arc::new(InMemoryBlacklist::default()))
    } else {
        // Create database connection pool
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;

        tracing::info!("Connected to database");

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        tracing::info!("Database migrations completed");

        let redis = RedisService::new(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Connected to Redis");

        (Repository::new(pool), Arc::new(redis))
    };

    Ok(Services::new(repository, config, blacklist, Arc::new(SystemClock)))
}

async fn serve(config: AppConfig, services: Services) -> anyhow::Result<()> {
    tracing::info!("Starting Biblio Server v{}", env!("CARGO_PKG_VERSION"));

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::app(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await?;

    Ok(())
}
