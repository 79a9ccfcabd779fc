use std::sync::Arc;

use crate::config::AppConfig;
use crate::logic::auth::AuthService;
use crate::logic::inventory::Inventory;
use crate::logic::saved_searches::SavedSearchStore;
use crate::store::Store;

/// Everything a request handler can reach, shared through axum state
pub struct AppContext<S: Store> {
    pub inventory: Inventory<S>,
    pub auth: AuthService,
    pub searches: SavedSearchStore,
    pub config: AppConfig,
}

impl<S: Store> AppContext<S> {
    pub fn new(store: Arc<S>, config: AppConfig) -> Self {
        Self {
            inventory: Inventory::new(store, config.cache_ttl()),
            auth: AuthService::new(config.token_ttl()),
            searches: SavedSearchStore::new(config.search_directory()),
            config,
        }
    }
}
