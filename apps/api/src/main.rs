mod ai;
mod billing;
mod config;
mod db;
mod errors;
mod models;
mod routes;
mod state;
mod store;
mod stripe;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ai::{ClaudeClient, PerplexityClient};
use crate::config::Config;
use crate::db::create_pool;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgStore;
use crate::stripe::StripeClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("align_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Align API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and the injected store
    let pool = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(pool));

    // Initialize upstream clients
    let stripe = StripeClient::new(config.stripe_secret_key.clone());
    info!("Stripe client initialized");

    let claude = ClaudeClient::new(config.anthropic_api_key.clone());
    info!("Claude client initialized (model: {})", ai::CLAUDE_MODEL);

    let perplexity = PerplexityClient::new(config.perplexity_api_key.clone());
    info!(
        "Perplexity client initialized (model: {})",
        ai::PERPLEXITY_MODEL
    );

    // Build app state
    let state = AppState {
        users: store.clone(),
        documents: store.clone(),
        stripe,
        claude,
        perplexity,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict to FRONTEND_URL origins in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    store.close().await;
    Ok(())
}
