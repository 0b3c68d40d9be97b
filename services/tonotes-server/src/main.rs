//! toNotes API Server
//!
//! Serves the authentication, session, 2FA and account endpoints.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! JWT_SECRET_KEY=... tonotes-server
//!
//! # Start with a config file
//! tonotes-server --config /etc/tonotes/server.toml
//!
//! # Nested overrides
//! TONOTES__AUTH__SESSION__MAX_ACTIVE=3 tonotes-server
//! ```

mod config;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tonotes_api::{create_router, ApiConfig, AppState};
use tonotes_auth::{
    janitor, AuthConfig, AuthService, Backends, GeoLocator, HttpGeoLocator, NoopGeoLocator,
};
use tonotes_db::{Database, DatabaseConfig};

use crate::config::{LoggingConfig, ServerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// toNotes API Server
#[derive(Parser, Debug)]
#[command(name = "tonotes-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "TONOTES_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "TONOTES_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TONOTES_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "TONOTES_LOG_FORMAT")]
    log_format: Option<String>,

    /// Label every session "Unknown Location" instead of calling the lookup service
    #[arg(long)]
    no_geo: bool,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;

    // CLI flags win over every other source
    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.port = port;
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }
    if args.no_geo {
        server_config.auth.geo.enabled = false;
    }

    init_logging(&server_config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting toNotes API Server"
    );

    validate_config(&server_config.auth)?;

    let db = init_database(&server_config.database).await?;
    let auth = init_auth(&server_config.auth, &db)?;

    // Background sweep of expired sessions
    let cancel = CancellationToken::new();
    let janitor = janitor::spawn(
        auth.sessions(),
        server_config.auth.session.janitor_interval,
        cancel.clone(),
    );

    let state = Arc::new(AppState::new(auth.clone(), db.clone()));
    let app = create_router(state, ApiConfig::from(&server_config.api));

    let addr = server_config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        host = %server_config.server.host,
        port = %server_config.server.port,
        "Server listening"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
    .into_future();

    let grace = server_config.server.shutdown_timeout();
    tokio::select! {
        result = server => result?,
        _ = force_close(shutdown, grace) => {
            tracing::warn!(
                timeout_secs = grace.as_secs(),
                "In-flight requests did not finish in time, closing"
            );
        }
    }

    cancel.cancel();
    if let Err(e) = janitor.await {
        tracing::error!(error = %e, "Session janitor task failed");
    }

    auth.close().await;
    match Arc::try_unwrap(db) {
        Ok(db) => db.close().await,
        Err(_) => tracing::warn!("Database still shared at shutdown, skipping close"),
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }
}

/// Refuse to start with an unusable auth configuration
fn validate_config(config: &AuthConfig) -> anyhow::Result<()> {
    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        anyhow::bail!(
            "Invalid auth configuration ({} problems). Set JWT_SECRET_KEY to at least 32 bytes.",
            errors.len()
        );
    }
    Ok(())
}

/// Connect to MongoDB and Redis
async fn init_database(config: &DatabaseConfig) -> anyhow::Result<Arc<Database>> {
    tracing::info!("Connecting to database...");

    let db = Database::connect(config).await?;

    let health = db.health_check().await;
    if !health.healthy {
        anyhow::bail!(
            "Database health check failed (mongo: {}, store: {})",
            health.mongo,
            health.store
        );
    }

    tracing::info!(
        mongo = health.mongo,
        store = health.store,
        "Database health check passed"
    );

    Ok(Arc::new(db))
}

/// Initialize authentication service
fn init_auth(config: &AuthConfig, db: &Database) -> anyhow::Result<Arc<AuthService>> {
    let geo: Arc<dyn GeoLocator> = if config.geo.enabled {
        Arc::new(HttpGeoLocator::new(&config.geo)?)
    } else {
        tracing::info!("IP geolocation disabled");
        Arc::new(NoopGeoLocator)
    };

    let auth = AuthService::new(config.clone(), Backends::from(db), geo);

    tracing::info!(
        max_sessions = config.session.max_active,
        session_secs = config.session.duration.as_secs(),
        "Authentication service initialized"
    );

    Ok(Arc::new(auth))
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown.cancel();
}

/// Resolves `grace` after shutdown begins
async fn force_close(shutdown: CancellationToken, grace: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(grace).await;
}

// =============================================================================
// Tests
// =============================================================================
