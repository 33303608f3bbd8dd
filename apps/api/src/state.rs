use std::sync::Arc;

use crate::ai::{ClaudeClient, PerplexityClient};
use crate::config::Config;
use crate::store::{DocumentStore, UserStore};
use crate::stripe::StripeClient;

/// Shared application state injected into all route handlers via Axum
/// extractors. Components are constructed once in `main` and injected —
/// the stores sit behind trait objects so tests can swap in `MemoryStore`.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub stripe: StripeClient,
    pub claude: ClaudeClient,
    pub perplexity: PerplexityClient,
    pub config: Config,
}
