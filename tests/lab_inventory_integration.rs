use std::sync::Arc;

use labtrack::config::AppConfig;
use labtrack::seed::load_seed_data;
use labtrack::MemoryStore;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token: None,
        }
    }

    fn with_token(&self, token: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.to_string()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::POST, path).json(&json).send().await
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::PUT, path).json(&json).send().await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::GET, path).send().await
    }

    async fn delete(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::DELETE, path).send().await
    }

    async fn login(&self, username: &str, password: &str) -> TestClient {
        let response = self
            .post("/users/login", json!({"username": username, "password": password}))
            .await
            .expect("Failed to log in");
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.expect("Invalid login response");
        let token = body["access_token"].as_str().expect("Missing access token");
        self.with_token(token)
    }
}

/// Start a server on an ephemeral port with a seeded in-memory store
async fn spawn_server(search_dir: &std::path::Path) -> String {
    let store = MemoryStore::new();
    load_seed_data(&store).await.expect("Failed to seed store");

    let mut config = AppConfig::default();
    config.search.directory = search_dir.to_string_lossy().to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let address = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        if let Err(e) = labtrack::serve(Arc::new(store), config, listener).await {
            eprintln!("Server stopped: {}", e);
        }
    });

    let base_url = format!("http://{}", address);
    let client = TestClient::new(base_url.clone());
    for _ in 0..50 {
        if let Ok(resp) = client.get("/health").await {
            if resp.status().is_success() {
                return base_url;
            }
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("Server did not become ready");
}

#[tokio::test]
async fn test_authentication_and_roles() {
    let dir = tempfile::tempdir().unwrap();
    let anonymous = TestClient::new(spawn_server(dir.path()).await);

    let response = anonymous.get("/compounds").await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = anonymous
        .post("/users/login", json!({"username": "admin", "password": "wrong"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let visitor = anonymous.login("visitor", "visitor123").await;
    let me: Value = visitor.get("/users/me").await.unwrap().json().await.unwrap();
    assert_eq!(me["role"], "visitor");

    // Visitors can read but not write
    let response = visitor.get("/compounds").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = visitor
        .post(
            "/transactions",
            json!({"instanceId": "inst-eth-2", "type": "use", "quantity": 10}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = anonymous.post("/users/logout", json!({})).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = visitor.post("/users/logout", json!({})).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = visitor.get("/compounds").await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = visitor.post("/users/logout", json!({})).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_catalog_and_transaction_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let admin = TestClient::new(spawn_server(dir.path()).await)
        .login("admin", "admin123")
        .await;

    println!("1. Listing compounds with pagination");
    let response = admin.get("/compounds?_limit=2&_sort=name").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-total-count")
            .and_then(|v| v.to_str().ok()),
        Some("5")
    );
    let page: Vec<Value> = response.json().await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["name"], "Acetone");

    println!("2. Rejecting an invalid compound");
    let response = admin
        .post("/compounds", json!({"name": "", "casNumber": "64-17-4"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: Value = response.json().await.unwrap();
    assert!(!error["details"].as_array().unwrap().is_empty());

    println!("3. Creating a compound and an instance");
    let response = admin
        .post(
            "/compounds",
            json!({"name": "Toluene", "casNumber": "108-88-3", "hazardClass": "Flammable", "unit": "mL", "threshold": 100}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let compound: Value = response.json().await.unwrap();
    let compound_id = compound["id"].as_str().unwrap().to_string();

    let response = admin
        .post(
            "/compoundInstances",
            json!({"compoundId": compound_id, "batchNumber": "TOL-1", "quantity": 150, "location": "Flammables Cabinet"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let instance: Value = response.json().await.unwrap();
    let instance_id = instance["id"].as_str().unwrap().to_string();
    assert_eq!(instance["unit"], "mL");

    println!("4. Applying transactions");
    let response = admin
        .post(
            "/transactions",
            json!({"instanceId": instance_id, "type": "use", "quantity": "100"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let applied: Value = response.json().await.unwrap();
    assert_eq!(applied["instance"]["quantity"], 50.0);
    assert_eq!(applied["transaction"]["previousQuantity"], 150.0);

    let response = admin
        .post(
            "/transactions",
            json!({"instanceId": instance_id, "type": "waste", "quantity": 80}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = admin
        .post(
            "/transactions",
            json!({"instanceId": "inst-missing", "type": "use", "quantity": 1}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    println!("5. Checking derived stock views");
    let stock: Value = admin
        .get(&format!("/compounds/{}/stock", compound_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stock["totalStock"], 50.0);
    assert_eq!(stock["isLowStock"], true);
    assert!(stock.get("converted").is_none());

    let stock: Value = admin
        .get(&format!("/compounds/{}/stock?unit=L", compound_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stock["converted"]["unit"], "L");
    let liters = stock["converted"]["totalStock"].as_f64().unwrap();
    assert!((liters - 0.05).abs() < 1e-9);

    let response = admin
        .get(&format!("/compounds/{}/stock?unit=kg", compound_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let low: Vec<Value> = admin.get("/stock/low").await.unwrap().json().await.unwrap();
    assert!(low.iter().any(|c| c["compoundId"] == compound_id.as_str()));

    let history: Vec<Value> = admin
        .get(&format!("/compoundInstances/{}/transactions", instance_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    println!("6. Editing and deleting");
    let response = admin
        .put(
            &format!("/compoundInstances/{}", instance_id),
            json!({"location": "Cold Room"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let locations: Vec<String> = admin.get("/locations").await.unwrap().json().await.unwrap();
    assert!(locations.contains(&"Cold Room".to_string()));

    let response = admin
        .delete(&format!("/compoundInstances/{}", instance_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = admin
        .get(&format!("/compoundInstances/{}", instance_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let report: Value = admin.get("/admin/consistency").await.unwrap().json().await.unwrap();
    assert_eq!(report["valid"], true);
}

#[tokio::test]
async fn test_count_session_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let admin = TestClient::new(spawn_server(dir.path()).await)
        .login("admin", "admin123")
        .await;

    let response = admin
        .post(
            "/countSessions",
            json!({"name": "Acid audit", "locations": ["Acid Cabinet"]}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session: Value = response.json().await.unwrap();
    let session_id = session["id"].as_str().unwrap().to_string();
    // The used-up bottle is not part of the snapshot
    assert_eq!(session["totalItems"], 1);

    let completion: Value = admin
        .get(&format!("/countSessions/{}/completion", session_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(completion["canComplete"], false);

    let response = admin
        .post(
            &format!("/countSessions/{}/counts", session_id),
            json!({"instanceId": "inst-hcl-2", "countedQuantity": 395}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record: Value = response.json().await.unwrap();
    assert_eq!(record["status"], "unverified");
    assert_eq!(record["discrepancy"], -5.0);

    let response = admin
        .post(
            &format!("/countSessions/{}/counts/inst-hcl-2/verify", session_id),
            json!({"resolution": "confirm"}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let progress: Value = admin
        .get(&format!("/countSessions/{}/progress", session_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress["progress"], 100.0);

    let response = admin
        .post(&format!("/countSessions/{}/complete", session_id), json!({"notes": "Done"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let completed: Value = response.json().await.unwrap();
    assert_eq!(completed["status"], "completed");

    let report: Value = admin
        .get(&format!("/countSessions/{}/discrepancies", session_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["items"].as_array().unwrap().len(), 1);

    // Completed sessions are read-only
    let response = admin
        .post(
            &format!("/countSessions/{}/counts", session_id),
            json!({"instanceId": "inst-hcl-2", "countedQuantity": 400}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Completing does not touch stored quantities
    let instance: Value = admin
        .get("/compoundInstances/inst-hcl-2")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(instance["quantity"], 400.0);
}

#[tokio::test]
async fn test_search_and_saved_searches() {
    let dir = tempfile::tempdir().unwrap();
    let visitor = TestClient::new(spawn_server(dir.path()).await)
        .login("visitor", "visitor123")
        .await;

    let results: Vec<Value> = visitor
        .post("/search", json!({"mode": "simple", "query": "acetone"}))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "cmp-acetone");

    let advanced = json!({
        "mode": "advanced",
        "conditions": [
            {"field": "hazardClass", "operator": "contains", "value": "flammable", "logic": "and"},
            {"field": "location", "operator": "equals", "value": "Flammables Cabinet"}
        ]
    });
    let results: Vec<Value> = visitor
        .post("/search", advanced.clone())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    let response = visitor
        .post(
            "/search",
            json!({"mode": "advanced", "conditions": [{"field": "quantity", "operator": "greaterThan", "value": "lots"}]}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = visitor
        .post("/searches/saved", json!({"name": "Flammables", "query": advanced}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let saved: Value = response.json().await.unwrap();

    let listed: Vec<Value> = visitor.get("/searches/saved").await.unwrap().json().await.unwrap();
    assert_eq!(listed.len(), 1);

    let response = visitor
        .delete(&format!("/searches/saved/{}", saved["id"].as_str().unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
