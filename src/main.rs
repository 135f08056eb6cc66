//! Hostwatch Cloud Server
//!
//! Central inventory baseline server for hostwatch agents. Monitored
//! hosts upload periodic snapshots of their processes, listening ports,
//! USB devices, login events and installed software; the server learns
//! per-host baselines, diffs every upload against the active baseline
//! and records anomaly alerts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     HOSTWATCH CLOUD                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │  API      │  │  Baseline    │  │  Retention Cleanup    │ │
//! │  │  Gateway  │  │  Engine      │  │  (Background Job)     │ │
//! │  │  (Axum)   │  │  (diff/freq) │  │                       │ │
//! │  └─────┬─────┘  └──────┬───────┘  └───────────┬───────────┘ │
//! │        └───────────────┼──────────────────────┘             │
//! │                        ▼                                    │
//! │                 ┌─────────────┐                             │
//! │                 │ PostgreSQL  │                             │
//! │                 └─────────────┘                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod baseline;
mod cleanup;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod rounds;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "hostwatch_cloud=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("Hostwatch Cloud Server starting...");
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

    // Initialize database pool
    let pool = db::create_pool(&config.database_url).await
        .expect("Failed to create database pool");

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await
        .expect("Failed to run migrations");

    // Background retention cleanup
    cleanup::spawn(pool.clone(), &config);

    // Build application state
    let state = AppState {
        pool,
        config: config.clone(),
        rounds: Arc::new(rounds::RoundCounter::new()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await
        .expect("Failed to bind server port");
    axum::serve(listener, app).await
        .expect("Server error");
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: config::Config,
    pub rounds: Arc<rounds::RoundCounter>,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Agent-facing routes
    let agent_routes = Router::new()
        .route("/api/v1/agent/report", post(handlers::agent::report))
        .route("/api/v1/agent/heartbeat", post(handlers::agent::heartbeat));

    // Management routes
    let management_routes = Router::new()
        // Host registry
        .route("/api/v1/agents", get(handlers::agent::list))
        .route("/api/v1/agents/:id", get(handlers::agent::get))
        .route("/api/v1/agents/:id", delete(handlers::agent::delete))

        // Baseline lifecycle
        .route("/api/v1/baseline/:agent_id", get(handlers::baseline::configs))
        .route("/api/v1/baseline/:agent_id/:category/learn", post(handlers::baseline::learn))
        .route("/api/v1/baseline/:agent_id/:category/complete", post(handlers::baseline::complete))
        .route("/api/v1/baseline/:agent_id/:category/import", post(handlers::baseline::import))
        .route("/api/v1/baseline/:agent_id/:category/copy", post(handlers::baseline::copy))
        .route("/api/v1/baseline/:agent_id/:category/manual", post(handlers::baseline::manual))
        .route("/api/v1/baseline/:agent_id/:category", delete(handlers::baseline::delete))

        // Baseline contents and on-demand comparison
        .route("/api/v1/baseline/:agent_id/:category/items", get(handlers::baseline::items))
        .route("/api/v1/baseline/:agent_id/:category/snapshots", get(handlers::baseline::snapshots))
        .route("/api/v1/baseline/:agent_id/:category/compare", get(handlers::baseline::compare_current))

        // Frequency baselines
        .route("/api/v1/baseline/:agent_id/frequency/rebuild", post(handlers::baseline::rebuild_frequency))
        .route("/api/v1/baseline/:agent_id/frequency/process", get(handlers::baseline::process_frequency))
        .route("/api/v1/baseline/:agent_id/frequency/port", get(handlers::baseline::port_frequency))

        // Alerts
        .route("/api/v1/alerts", get(handlers::alerts::list))
        .route("/api/v1/alerts/stats", get(handlers::alerts::stats))
        .route("/api/v1/alerts/:id/ack", put(handlers::alerts::acknowledge))
        .route("/api/v1/alerts/:id/resolve", put(handlers::alerts::resolve))
        .route("/api/v1/alerts/:id/ignore", put(handlers::alerts::ignore));

    // Combine all routes
    Router::new()
        .route("/health", get(handlers::health::check))
        .merge(agent_routes)
        .merge(management_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
