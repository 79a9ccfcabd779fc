use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check and documentation
        .route("/health", get(handlers::health_check))
        .route("/docs", get(handlers::get_api_docs))
        .route("/docs/openapi.json", get(handlers::get_openapi_spec))
        // Users and sessions
        .route("/users/login", post(handlers::login::<S>))
        .route("/users/logout", post(handlers::logout::<S>))
        .route("/users/me", get(handlers::current_user))
        .route(
            "/users",
            get(handlers::list_users::<S>).post(handlers::create_user::<S>),
        )
        // Compounds
        .route(
            "/compounds",
            get(handlers::list_compounds::<S>).post(handlers::create_compound::<S>),
        )
        .route(
            "/compounds/:id",
            get(handlers::get_compound::<S>)
                .put(handlers::update_compound::<S>)
                .delete(handlers::delete_compound::<S>),
        )
        .route("/compounds/:id/stock", get(handlers::get_compound_stock::<S>))
        .route(
            "/compounds/:id/instances",
            get(handlers::get_compound_instances::<S>),
        )
        .route(
            "/compounds/:id/transactions",
            get(handlers::get_compound_transactions::<S>),
        )
        // Compound instances
        .route(
            "/compoundInstances",
            get(handlers::list_instances::<S>).post(handlers::create_instance::<S>),
        )
        .route(
            "/compoundInstances/:id",
            get(handlers::get_instance::<S>)
                .put(handlers::update_instance::<S>)
                .delete(handlers::delete_instance::<S>),
        )
        .route(
            "/compoundInstances/:id/transactions",
            get(handlers::get_instance_transactions::<S>),
        )
        // Transactions
        .route(
            "/transactions",
            get(handlers::list_transactions::<S>).post(handlers::apply_transaction::<S>),
        )
        .route("/transactions/statistics", get(handlers::get_statistics::<S>))
        .route(
            "/transactions/:id",
            get(handlers::get_transaction::<S>)
                .put(handlers::update_transaction::<S>)
                .delete(handlers::delete_transaction::<S>),
        )
        // Stock views
        .route("/stock/low", get(handlers::get_low_stock::<S>))
        .route("/stock/expiring", get(handlers::get_expiring::<S>))
        .route("/locations", get(handlers::get_locations::<S>))
        .route("/units/convert", get(handlers::convert_units))
        // Inventory count sessions
        .route(
            "/countSessions",
            get(handlers::list_sessions::<S>).post(handlers::create_session::<S>),
        )
        .route(
            "/countSessions/:id",
            get(handlers::get_session::<S>)
                .put(handlers::update_session::<S>)
                .delete(handlers::delete_session::<S>),
        )
        .route("/countSessions/:id/counts", post(handlers::record_count::<S>))
        .route(
            "/countSessions/:id/counts/:instance_id/verify",
            post(handlers::verify_count::<S>),
        )
        .route(
            "/countSessions/:id/newInstances",
            post(handlers::add_session_instance::<S>),
        )
        .route(
            "/countSessions/:id/progress",
            get(handlers::get_session_progress::<S>),
        )
        .route(
            "/countSessions/:id/completion",
            get(handlers::get_session_completion::<S>),
        )
        .route(
            "/countSessions/:id/complete",
            post(handlers::complete_session::<S>),
        )
        .route(
            "/countSessions/:id/discrepancies",
            get(handlers::get_discrepancies::<S>),
        )
        // Search
        .route("/search", post(handlers::search::<S>))
        .route("/search/fields", get(handlers::get_search_fields))
        .route(
            "/searches/saved",
            get(handlers::list_saved_searches::<S>).post(handlers::save_search::<S>),
        )
        .route(
            "/searches/saved/:id",
            axum::routing::delete(handlers::delete_saved_search::<S>),
        )
        .route(
            "/searches/saved/:id/load",
            post(handlers::load_saved_search::<S>),
        )
        .route("/searches/history", get(handlers::get_search_history::<S>))
        // Administration
        .route(
            "/admin/consistency",
            get(handlers::get_consistency_report::<S>),
        )
        .route("/admin/reload", post(handlers::reload::<S>))
}

/// Router with state, CORS and, when configured, the static web UI as fallback
pub fn build_app<S: Store + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static("x-total-count")]);

    let mut router = create_router::<S>();
    if let Some(dir) = state.config.server.static_dir.clone() {
        let index = format!("{}/index.html", dir.trim_end_matches('/'));
        router = router.fallback_service(ServeDir::new(&dir).fallback(ServeFile::new(index)));
    }

    router
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}
