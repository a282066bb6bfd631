use std::sync::Arc;

use crate::auth::session::SessionManager;
use crate::auth::token::TokenIssuer;
use crate::config::Config;
use crate::store::{Store, TaskRepository, UserRepository};
use crate::suggestions::SuggestionSource;

/// Shared application state, registered once as `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub tokens: TokenIssuer,
    pub sessions: SessionManager,
    pub suggestions: Arc<dyn SuggestionSource>,
    /// Exposes error details in 500 responses.
    pub debug: bool,
    pub bcrypt_cost: u32,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, suggestions: Arc<dyn SuggestionSource>, config: &Config) -> Self
    where
        S: Store + 'static,
    {
        Self {
            users: store.clone(),
            tasks: store.clone(),
            tokens: TokenIssuer::new(store.clone(), store.clone()),
            sessions: SessionManager::new(store, config.session_lifetime, config.secure_cookies)
                .with_sweep_odds(config.session_sweep_chance, 100),
            suggestions,
            debug: config.debug,
            bcrypt_cost: config.bcrypt_cost,
        }
    }
}
