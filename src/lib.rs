pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

pub use api::handlers;
pub use api::routes;

pub use app::AppContext;
pub use error::{InventoryError, InventoryResult};
pub use logic::inventory::Inventory;

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, RestStore, Store};

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::{AppConfig, StorageBackend};

/// Build the shared context, load the cache and serve on an already bound listener
pub async fn serve<S: Store + 'static>(
    store: Arc<S>,
    config: AppConfig,
    listener: TcpListener,
) -> anyhow::Result<()> {
    let context = Arc::new(AppContext::new(store, config));
    context.inventory.load().await?;

    let app = crate::api::routes::build_app(context);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn bind_and_serve<S: Store + 'static>(store: Arc<S>, config: AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("LabTrack server running on http://{}", bind_address);
    println!("API documentation available at http://{}/docs", bind_address);

    serve(store, config, listener).await
}

/// Start the service on the configured storage backend
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    match config.storage.backend {
        StorageBackend::Memory => {
            println!("Using in-memory storage");
            let store = MemoryStore::new();
            if config.seed.load {
                seed::load_seed_data(&store).await?;
                println!("Seed data loaded");
            }
            bind_and_serve(Arc::new(store), config).await
        }
        StorageBackend::Postgres => {
            println!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(
                &database_url,
                config.storage.max_connections.unwrap_or(20),
            )
            .await?;

            println!("Running database migrations...");
            store.migrate().await?;

            if config.seed.load {
                seed::load_seed_data(&store).await?;
            }
            bind_and_serve(Arc::new(store), config).await
        }
        StorageBackend::Rest => {
            let base_url = config.rest_url()?.to_string();
            println!("Using remote store at {}", base_url);
            let store = RestStore::new(&base_url, config.rest_timeout())?;
            if let (Some(username), Some(password)) = (
                config.storage.rest_username.as_deref(),
                config.storage.rest_password.as_deref(),
            ) {
                store.login(username, password).await?;
            }
            bind_and_serve(Arc::new(store), config).await
        }
    }
}
