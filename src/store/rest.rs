use anyhow::{Context, Result};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::model::{ListParams, Page};
use crate::store::traits::{document_id, Collection, DocumentStore};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// The remote store rejected the token; the session has been cleared
    #[error("Remote store rejected the credentials")]
    Unauthorized,

    #[error("Remote store returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    access_token: String,
}

/// Client for a generic JSON REST store (json-server style routes)
#[derive(Debug)]
pub struct RestStore {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl RestStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn with_token(self, token: Option<String>) -> Self {
        *self.token.write() = token;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Log in against `/users/login` and keep the bearer token for later requests
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("users/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .context("Login request to remote store failed")?;
        let response = self.check(response).await?;
        let reply: LoginReply = response
            .json()
            .await
            .context("Malformed login reply from remote store")?;
        *self.token.write() = Some(reply.access_token);
        log::info!("Authenticated against remote store {}", self.base_url);
        Ok(())
    }

    /// Map error statuses; a 401 drops the token
    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            *self.token.write() = None;
            log::warn!("Remote store returned 401, clearing session");
            return Err(RemoteStoreError::Unauthorized.into());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteStoreError::Status { status, body }.into())
    }
}

#[async_trait::async_trait]
impl DocumentStore for RestStore {
    async fn list_documents(&self, collection: Collection, params: &ListParams) -> Result<Page<Value>> {
        let request = self.client.get(self.url(collection.as_str())).query(params);
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Failed to list {}", collection))?;
        let response = self.check(response).await?;

        let total_header = response
            .headers()
            .get("x-total-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let items: Vec<Value> = response
            .json()
            .await
            .with_context(|| format!("Malformed {} listing", collection))?;
        let total = total_header.unwrap_or(items.len());
        Ok(Page { items, total })
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let request = self
            .client
            .get(self.url(&format!("{}/{}", collection, id)));
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} '{}'", collection, id))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check(response).await?;
        Ok(Some(response.json().await.with_context(|| {
            format!("Malformed {} document '{}'", collection, id)
        })?))
    }

    async fn insert_document(&self, collection: Collection, document: Value) -> Result<Value> {
        let id = document_id(&document).unwrap_or_default().to_string();
        let request = self.client.post(self.url(collection.as_str())).json(&document);
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Failed to insert {} '{}'", collection, id))?;
        let response = self.check(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Malformed reply inserting {}", collection))
    }

    async fn replace_document(&self, collection: Collection, id: &str, document: Value) -> Result<Option<Value>> {
        let request = self
            .client
            .put(self.url(&format!("{}/{}", collection, id)))
            .json(&document);
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Failed to update {} '{}'", collection, id))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check(response).await?;
        Ok(Some(response.json().await.with_context(|| {
            format!("Malformed reply updating {} '{}'", collection, id)
        })?))
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<bool> {
        let request = self
            .client
            .delete(self.url(&format!("{}/{}", collection, id)));
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Failed to delete {} '{}'", collection, id))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check(response).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryError;
    use crate::store::traits::{CompoundStore, InstanceStore};
    use axum::{
        extract::Query,
        http::{header::AUTHORIZATION, HeaderMap, StatusCode as HttpStatus},
        response::{IntoResponse, Response as AxumResponse},
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    const TOKEN: &str = "remote-token";

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some("Bearer remote-token")
    }

    async fn list_compounds(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> AxumResponse {
        if !authorized(&headers) {
            return HttpStatus::UNAUTHORIZED.into_response();
        }
        let limit: usize = query.get("_limit").and_then(|l| l.parse().ok()).unwrap_or(3);
        let items: Vec<Value> = (0..limit)
            .map(|i| json!({"id": format!("c{}", i), "name": format!("Compound {}", i)}))
            .collect();
        ([("x-total-count", "42")], Json(items)).into_response()
    }

    /// Remote json-server stand-in: login issues a token, compounds need it,
    /// instances always reject the session
    async fn spawn_remote() -> String {
        let app = Router::new()
            .route(
                "/users/login",
                post(|| async { Json(json!({ "access_token": TOKEN })) }),
            )
            .route("/compounds", get(list_compounds))
            .route("/compoundInstances", get(|| async { HttpStatus::UNAUTHORIZED }))
            .route(
                "/transactions",
                get(|| async { (HttpStatus::SERVICE_UNAVAILABLE, "maintenance") }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", address)
    }

    #[test]
    fn test_url_joining() {
        let store = RestStore::new("http://localhost:3001/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(store.url("compounds"), "http://localhost:3001/compounds");
        assert_eq!(store.url("/users/login"), "http://localhost:3001/users/login");
        assert!(!store.is_authenticated());
        let store = store.with_token(Some("abc".to_string()));
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn test_paged_list_uses_total_count_header() {
        let store = RestStore::new(&spawn_remote().await, DEFAULT_TIMEOUT).unwrap();
        store.login("admin", "admin123").await.unwrap();
        assert!(store.is_authenticated());

        let page = store.list_compounds(&ListParams::default().limited(2)).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 42);
        assert_eq!(page.items[1].name, "Compound 1");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session() {
        let store = RestStore::new(&spawn_remote().await, DEFAULT_TIMEOUT).unwrap();
        store.login("admin", "admin123").await.unwrap();

        let error = store.list_instances(&ListParams::default()).await.unwrap_err();
        assert!(!store.is_authenticated());
        assert!(matches!(InventoryError::from(error), InventoryError::Unauthorized));

        // Without a token the compounds route rejects as well
        let error = store.list_compounds(&ListParams::default()).await.unwrap_err();
        assert!(matches!(InventoryError::from(error), InventoryError::Unauthorized));
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let store = RestStore::new(&spawn_remote().await, DEFAULT_TIMEOUT).unwrap();
        let error = store
            .list_documents(Collection::Transactions, &ListParams::default())
            .await
            .unwrap_err();
        match error.downcast_ref::<RemoteStoreError>() {
            Some(RemoteStoreError::Status { status, body }) => {
                assert_eq!(*status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(InventoryError::from(error), InventoryError::Store(_)));
    }
}
