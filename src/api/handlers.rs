use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, Json},
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::auth::{bearer_token, AdminUser};
use crate::app::AppContext;
use crate::error::InventoryError;
use crate::logic::consistency::ConsistencyReport;
use crate::logic::count_session::DiscrepancyReport;
use crate::logic::inventory::{AppliedTransaction, StockReport};
use crate::logic::search::{field_descriptors, CompoundView, FieldDescriptor};
use crate::logic::stock::{CompoundStock, TransactionStatistics, DEFAULT_EXPIRY_HORIZON_MONTHS};
use crate::logic::units;
use crate::model::{
    CompleteSessionRequest, CompletionStatus, Compound, CompoundInstance, CompoundUpdate,
    CountEntry, CountRecord, CountSessionUpdate, Id, InstanceUpdate, InventoryCountSession,
    ListParams, LoginRequest, LoginResponse, NewCompound, NewCountSession, NewInstance, NewUser,
    Page, PublicUser, SaveSearchRequest, SavedSearch, SearchQuery, SessionProgress, Transaction,
    TransactionRequest, TransactionUpdate, UserContext, VerifyRequest,
};
use crate::store::{RemoteStoreError, Store};

pub type AppState<S> = Arc<AppContext<S>>;

pub type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// List body plus the `X-Total-Count` header
pub type Listing = ([(&'static str, String); 1], Json<Vec<Value>>);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

fn is_upstream_failure(error: &anyhow::Error) -> bool {
    error.downcast_ref::<RemoteStoreError>().is_some() || error.downcast_ref::<reqwest::Error>().is_some()
}

pub fn error_status(error: &InventoryError) -> StatusCode {
    match error {
        InventoryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InventoryError::NotFound { .. } => StatusCode::NOT_FOUND,
        InventoryError::InvalidState(_) => StatusCode::CONFLICT,
        InventoryError::Unauthorized => StatusCode::UNAUTHORIZED,
        InventoryError::Forbidden(_) => StatusCode::FORBIDDEN,
        InventoryError::Store(e) if is_upstream_failure(e) => StatusCode::BAD_GATEWAY,
        InventoryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn api_error(error: InventoryError) -> (StatusCode, Json<ErrorResponse>) {
    let status = error_status(&error);
    if status.is_server_error() {
        log::error!("Request failed: {}", error);
    }
    (
        status,
        Json(ErrorResponse::new(&error.to_string()).with_details(error.details())),
    )
}

fn listing(page: Page<Value>) -> Listing {
    ([("x-total-count", page.total.to_string())], Json(page.items))
}

// ---- documentation --------------------------------------------------------

/// (method, path, summary, tag)
const ROUTES: &[(&str, &str, &str, &str)] = &[
    ("get", "/health", "Service health", "System"),
    ("post", "/users/login", "Log in and receive a bearer token", "Users"),
    ("post", "/users/logout", "Revoke the current token", "Users"),
    ("get", "/users/me", "Acting user", "Users"),
    ("get", "/users", "List users (admin)", "Users"),
    ("post", "/users", "Create a user (admin)", "Users"),
    ("get", "/compounds", "List compounds", "Compounds"),
    ("post", "/compounds", "Create a compound", "Compounds"),
    ("get", "/compounds/{id}", "Get a compound", "Compounds"),
    ("put", "/compounds/{id}", "Update a compound", "Compounds"),
    ("delete", "/compounds/{id}", "Delete a compound", "Compounds"),
    ("get", "/compounds/{id}/stock", "Total stock and instance summary, optionally in ?unit", "Stock"),
    ("get", "/compounds/{id}/instances", "Instances of a compound", "Compounds"),
    ("get", "/compounds/{id}/transactions", "Transactions of a compound", "Transactions"),
    ("get", "/compoundInstances", "List instances", "Instances"),
    ("post", "/compoundInstances", "Create an instance", "Instances"),
    ("get", "/compoundInstances/{id}", "Get an instance", "Instances"),
    ("put", "/compoundInstances/{id}", "Update an instance", "Instances"),
    ("delete", "/compoundInstances/{id}", "Delete an instance", "Instances"),
    ("get", "/compoundInstances/{id}/transactions", "Transactions of an instance", "Transactions"),
    ("get", "/transactions", "List transactions", "Transactions"),
    ("post", "/transactions", "Apply a transaction to an instance", "Transactions"),
    ("get", "/transactions/statistics", "Transaction statistics", "Transactions"),
    ("get", "/transactions/{id}", "Get a transaction", "Transactions"),
    ("put", "/transactions/{id}", "Correct a logged transaction", "Transactions"),
    ("delete", "/transactions/{id}", "Delete a logged transaction", "Transactions"),
    ("get", "/stock/low", "Compounds below their threshold", "Stock"),
    ("get", "/stock/expiring", "Instances expiring within ?months=N", "Stock"),
    ("get", "/locations", "Known storage locations", "Stock"),
    ("get", "/units/convert", "Convert ?value between ?from and ?to units", "Stock"),
    ("get", "/countSessions", "List count sessions", "Count sessions"),
    ("post", "/countSessions", "Start a count session", "Count sessions"),
    ("get", "/countSessions/{id}", "Get a count session", "Count sessions"),
    ("put", "/countSessions/{id}", "Edit session name, description or notes", "Count sessions"),
    ("delete", "/countSessions/{id}", "Delete a count session", "Count sessions"),
    ("post", "/countSessions/{id}/counts", "Record a count", "Count sessions"),
    ("post", "/countSessions/{id}/counts/{instanceId}/verify", "Resolve an unverified count", "Count sessions"),
    ("post", "/countSessions/{id}/newInstances", "Add an instance found during the count", "Count sessions"),
    ("get", "/countSessions/{id}/progress", "Counting progress", "Count sessions"),
    ("get", "/countSessions/{id}/completion", "Whether the session can be completed", "Count sessions"),
    ("post", "/countSessions/{id}/complete", "Complete the session", "Count sessions"),
    ("get", "/countSessions/{id}/discrepancies", "Discrepancy report", "Count sessions"),
    ("post", "/search", "Simple or advanced compound search", "Search"),
    ("get", "/search/fields", "Searchable fields and operators", "Search"),
    ("get", "/searches/saved", "Saved searches of the acting user", "Search"),
    ("post", "/searches/saved", "Save a search", "Search"),
    ("delete", "/searches/saved/{id}", "Delete a saved search", "Search"),
    ("post", "/searches/saved/{id}/load", "Load a saved search", "Search"),
    ("get", "/searches/history", "Recently loaded searches", "Search"),
    ("get", "/admin/consistency", "Data consistency report", "Admin"),
    ("post", "/admin/reload", "Reload the cache from the store", "Admin"),
];

pub async fn get_api_docs() -> Html<String> {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>LabTrack API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body {
            margin: 0;
            background: #fafafa;
        }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: '/docs/openapi.json',
                dom_id: '#swagger-ui',
                deepLinking: true
            });
        };
    </script>
</body>
</html>
"#;
    Html(html.to_string())
}

pub async fn get_openapi_spec() -> Json<Value> {
    let mut paths = serde_json::Map::new();
    for (method, path, summary, tag) in ROUTES {
        let entry = paths
            .entry(path.to_string())
            .or_insert_with(|| json!({}));
        entry[*method] = json!({
            "summary": summary,
            "tags": [tag],
            "responses": { "200": { "description": "Success" } }
        });
    }
    Json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": "LabTrack API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Laboratory chemical inventory: compounds, instances, transactions and count sessions"
        },
        "servers": [{ "url": "/", "description": "Current server" }],
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" }
            }
        },
        "security": [{ "bearerAuth": [] }],
        "paths": paths
    }))
}

// ---- users ----------------------------------------------------------------

pub async fn login<S: Store>(
    State(ctx): State<AppState<S>>,
    RequestJson(request): RequestJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    ctx.auth
        .login(&ctx.inventory, request)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Revoke the presented token. Requests without a live token get 401.
pub async fn logout<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let token = bearer_token(&headers).ok_or_else(|| api_error(InventoryError::Unauthorized))?;
    ctx.auth.revoke(token);
    log::info!("User {} logged out", user.user_name);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn current_user(user: UserContext) -> Json<UserContext> {
    Json(user)
}

pub async fn list_users<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<PublicUser>>> {
    ctx.inventory.list_users().await.map(Json).map_err(api_error)
}

pub async fn create_user<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    RequestJson(request): RequestJson<NewUser>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    let user = ctx.inventory.create_user(request).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(user)))
}

// ---- compounds ------------------------------------------------------------

pub async fn list_compounds<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Query(params): Query<ListParams>,
) -> ApiResult<Listing> {
    ctx.inventory
        .list_compounds(&params)
        .await
        .map(listing)
        .map_err(api_error)
}

pub async fn get_compound<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<Compound>> {
    ctx.inventory.get_compound(&id).await.map(Json).map_err(api_error)
}

pub async fn create_compound<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    RequestJson(request): RequestJson<NewCompound>,
) -> ApiResult<(StatusCode, Json<Compound>)> {
    let compound = ctx.inventory.create_compound(request).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(compound)))
}

pub async fn update_compound<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    Path(id): Path<Id>,
    RequestJson(update): RequestJson<CompoundUpdate>,
) -> ApiResult<Json<Compound>> {
    ctx.inventory
        .update_compound(&id, update)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_compound<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    ctx.inventory.delete_compound(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub unit: Option<String>,
}

pub async fn get_compound_stock<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
    Query(query): Query<StockQuery>,
) -> ApiResult<Json<StockReport>> {
    ctx.inventory
        .stock_report(&id, query.unit.as_deref())
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn get_compound_instances<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<CompoundInstance>>> {
    ctx.inventory.instances_of(&id).await.map(Json).map_err(api_error)
}

pub async fn get_compound_transactions<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<Transaction>>> {
    ctx.inventory
        .transactions_for_compound(&id)
        .await
        .map(Json)
        .map_err(api_error)
}

// ---- instances ------------------------------------------------------------

pub async fn list_instances<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Query(params): Query<ListParams>,
) -> ApiResult<Listing> {
    ctx.inventory
        .list_instances(&params)
        .await
        .map(listing)
        .map_err(api_error)
}

pub async fn get_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<CompoundInstance>> {
    ctx.inventory.get_instance(&id).await.map(Json).map_err(api_error)
}

pub async fn create_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    RequestJson(request): RequestJson<NewInstance>,
) -> ApiResult<(StatusCode, Json<CompoundInstance>)> {
    let instance = ctx.inventory.create_instance(request).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn update_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    Path(id): Path<Id>,
    RequestJson(update): RequestJson<InstanceUpdate>,
) -> ApiResult<Json<CompoundInstance>> {
    ctx.inventory
        .update_instance(&id, update)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    ctx.inventory.delete_instance(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_instance_transactions<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<Transaction>>> {
    ctx.inventory
        .transactions_for_instance(&id)
        .await
        .map(Json)
        .map_err(api_error)
}

// ---- transactions ---------------------------------------------------------

pub async fn list_transactions<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Query(params): Query<ListParams>,
) -> ApiResult<Listing> {
    ctx.inventory
        .list_transactions(&params)
        .await
        .map(listing)
        .map_err(api_error)
}

pub async fn get_transaction<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<Transaction>> {
    ctx.inventory.get_transaction(&id).await.map(Json).map_err(api_error)
}

pub async fn apply_transaction<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
    RequestJson(request): RequestJson<TransactionRequest>,
) -> ApiResult<(StatusCode, Json<AppliedTransaction>)> {
    let applied = ctx
        .inventory
        .apply_transaction(request, &user)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(applied)))
}

pub async fn update_transaction<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
    Path(id): Path<Id>,
    RequestJson(update): RequestJson<TransactionUpdate>,
) -> ApiResult<Json<Transaction>> {
    ctx.inventory
        .update_transaction(&id, update, &user)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_transaction<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    ctx.inventory
        .delete_transaction(&id, &user)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_statistics<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
) -> ApiResult<Json<TransactionStatistics>> {
    ctx.inventory.statistics().await.map(Json).map_err(api_error)
}

// ---- stock ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub months: Option<u32>,
}

pub async fn get_low_stock<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
) -> ApiResult<Json<Vec<CompoundStock>>> {
    ctx.inventory.low_stock().await.map(Json).map_err(api_error)
}

pub async fn get_expiring<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Query(query): Query<ExpiringQuery>,
) -> ApiResult<Json<Vec<CompoundInstance>>> {
    let months = query.months.unwrap_or(DEFAULT_EXPIRY_HORIZON_MONTHS);
    ctx.inventory.expiring(months).await.map(Json).map_err(api_error)
}

pub async fn get_locations<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
) -> ApiResult<Json<Vec<String>>> {
    ctx.inventory.locations().await.map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub value: f64,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub value: f64,
    pub from: String,
    pub to: String,
    pub result: f64,
}

pub async fn convert_units(
    _user: UserContext,
    Query(query): Query<ConvertQuery>,
) -> ApiResult<Json<ConvertResponse>> {
    let result = units::convert(query.value, &query.from, &query.to).ok_or_else(|| {
        api_error(InventoryError::validation(format!(
            "Cannot convert from '{}' to '{}'",
            query.from, query.to
        )))
    })?;
    Ok(Json(ConvertResponse {
        value: query.value,
        from: query.from,
        to: query.to,
        result,
    }))
}

// ---- count sessions -------------------------------------------------------

pub async fn list_sessions<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Query(params): Query<ListParams>,
) -> ApiResult<Listing> {
    ctx.inventory
        .list_sessions(&params)
        .await
        .map(listing)
        .map_err(api_error)
}

pub async fn get_session<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<InventoryCountSession>> {
    ctx.inventory.get_session(&id).await.map(Json).map_err(api_error)
}

pub async fn create_session<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
    RequestJson(request): RequestJson<NewCountSession>,
) -> ApiResult<(StatusCode, Json<InventoryCountSession>)> {
    let session = ctx
        .inventory
        .create_session(request, &user)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn update_session<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    Path(id): Path<Id>,
    RequestJson(update): RequestJson<CountSessionUpdate>,
) -> ApiResult<Json<InventoryCountSession>> {
    ctx.inventory
        .update_session(&id, update)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_session<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    ctx.inventory.delete_session(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_count<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
    Path(id): Path<Id>,
    RequestJson(entry): RequestJson<CountEntry>,
) -> ApiResult<Json<CountRecord>> {
    ctx.inventory
        .record_count(&id, entry, &user)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn verify_count<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
    Path((id, instance_id)): Path<(Id, Id)>,
    RequestJson(request): RequestJson<VerifyRequest>,
) -> ApiResult<Json<CountRecord>> {
    ctx.inventory
        .verify_count(&id, &instance_id, request.resolution)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn add_session_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
    Path(id): Path<Id>,
    RequestJson(request): RequestJson<NewInstance>,
) -> ApiResult<(StatusCode, Json<CompoundInstance>)> {
    let instance = ctx
        .inventory
        .add_session_instance(&id, request, &user)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn get_session_progress<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<SessionProgress>> {
    ctx.inventory.session_progress(&id).await.map(Json).map_err(api_error)
}

pub async fn get_session_completion<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<CompletionStatus>> {
    ctx.inventory.completion_status(&id).await.map(Json).map_err(api_error)
}

pub async fn complete_session<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
    Path(id): Path<Id>,
    request: Option<RequestJson<CompleteSessionRequest>>,
) -> ApiResult<Json<InventoryCountSession>> {
    let notes = request.and_then(|RequestJson(r)| r.notes);
    ctx.inventory
        .complete_session(&id, notes, &user)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn get_discrepancies<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<DiscrepancyReport>> {
    ctx.inventory.discrepancy_report(&id).await.map(Json).map_err(api_error)
}

// ---- search ---------------------------------------------------------------

pub async fn search<S: Store>(
    State(ctx): State<AppState<S>>,
    _user: UserContext,
    RequestJson(query): RequestJson<SearchQuery>,
) -> ApiResult<Json<Vec<CompoundView>>> {
    ctx.inventory.search(&query).await.map(Json).map_err(api_error)
}

pub async fn get_search_fields(_user: UserContext) -> Json<Vec<FieldDescriptor>> {
    Json(field_descriptors())
}

pub async fn list_saved_searches<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
) -> ApiResult<Json<Vec<SavedSearch>>> {
    ctx.searches
        .list_saved(&user.user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn save_search<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    RequestJson(request): RequestJson<SaveSearchRequest>,
) -> ApiResult<(StatusCode, Json<SavedSearch>)> {
    let saved = ctx
        .searches
        .save(&user.user_id, request)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn delete_saved_search<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    ctx.searches
        .delete(&user.user_id, &id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn load_saved_search<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<Id>,
) -> ApiResult<Json<SavedSearch>> {
    ctx.searches
        .load(&user.user_id, &id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn get_search_history<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
) -> ApiResult<Json<Vec<SavedSearch>>> {
    ctx.searches
        .history(&user.user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

// ---- admin ----------------------------------------------------------------

pub async fn get_consistency_report<S: Store>(
    State(ctx): State<AppState<S>>,
    _admin: AdminUser,
) -> ApiResult<Json<ConsistencyReport>> {
    ctx.inventory.consistency_report().await.map(Json).map_err(api_error)
}

pub async fn reload<S: Store>(
    State(ctx): State<AppState<S>>,
    AdminUser(user): AdminUser,
) -> ApiResult<Json<HealthResponse>> {
    ctx.inventory.load().await.map_err(api_error)?;
    log::info!("Cache reloaded on request of {}", user.user_name);
    Ok(Json(HealthResponse {
        status: "reloaded".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&InventoryError::validation("bad")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&InventoryError::not_found("Compound", "c1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&InventoryError::InvalidState("done".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(error_status(&InventoryError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            error_status(&InventoryError::Store(anyhow::anyhow!("disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let upstream = anyhow::Error::from(RemoteStoreError::Status {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        });
        assert_eq!(
            error_status(&InventoryError::Store(upstream)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_body_lists_details() {
        let (status, Json(body)) = api_error(InventoryError::Validation(vec![
            "Quantity must be a valid number".to_string(),
            "Unknown transaction type 'sell'".to_string(),
        ]));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.details.len(), 2);
        assert!(body.error.starts_with("Validation failed"));
    }

    #[tokio::test]
    async fn test_logout_without_token_is_unauthorized() {
        let mut config = crate::config::AppConfig::default();
        config.auth.allow_anonymous = true;
        let ctx = Arc::new(AppContext::new(Arc::new(crate::store::MemoryStore::new()), config));

        let (status, _) = logout(State(ctx), UserContext::default_user(), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_openapi_lists_every_route() {
        let Json(document) = get_openapi_spec().await;
        let paths = document["paths"].as_object().unwrap();
        assert!(paths.contains_key("/transactions"));
        assert!(paths["/transactions"].get("post").is_some());
        assert!(paths["/countSessions/{id}/complete"].get("post").is_some());
    }
}
