use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use perch::auth::token::{generate_secret, TokenKeys};
use perch::config::{Cli, Config, JWT_SECRET_ENV};
use perch::db;
use perch::media::{LocalMediaStore, MediaClient};
use perch::routes;
use perch::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    let uploads_dir = config.uploads_path();
    std::fs::create_dir_all(&uploads_dir)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path(), &config.database)?;
    db::run_migrations(&pool)?;

    let secret = match config.auth.jwt_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!(
                "{} is not set; using an ephemeral secret, tokens will not survive a restart",
                JWT_SECRET_ENV
            );
            generate_secret()
        }
    };
    let tokens = TokenKeys::new(secret.as_bytes(), config.auth.token_hours);

    let store = LocalMediaStore::new(uploads_dir, &config.storage.public_url);
    let media = MediaClient::new(Arc::new(store), config.storage.timeout());

    // Build app state
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        tokens: Arc::new(tokens),
        media,
    };

    let app = routes::app(state);

    // Start server
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
