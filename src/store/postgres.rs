use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};

use crate::model::{generate_id, ListParams, Page};
use crate::store::traits::{Collection, DocumentStore};

/// Document store over a single JSONB table keyed by (collection, id)
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the documents table if it does not exist yet
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create documents table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS documents_collection_created_idx ON documents (collection, created_at)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create documents index")?;

        log::info!("Document table ready");
        Ok(())
    }
}

fn with_id(mut document: Value, collection: Collection, id: &str) -> Result<Value> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| anyhow!("{} documents must be JSON objects", collection))?;
    object.insert("id".to_string(), Value::String(id.to_string()));
    Ok(document)
}

#[async_trait::async_trait]
impl DocumentStore for PostgresStore {
    async fn list_documents(&self, collection: Collection, params: &ListParams) -> Result<Page<Value>> {
        let rows = sqlx::query(
            "SELECT data FROM documents WHERE collection = $1 ORDER BY created_at, id",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list {}", collection))?;

        let documents = rows
            .into_iter()
            .map(|row| row.try_get::<Json<Value>, _>("data").map(|json| json.0))
            .collect::<std::result::Result<Vec<Value>, _>>()
            .with_context(|| format!("Failed to decode {} documents", collection))?;

        Ok(params.apply(documents))
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {} '{}'", collection, id))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let Json(document) = row
            .try_get::<Json<Value>, _>("data")
            .with_context(|| format!("Failed to decode {} '{}'", collection, id))?;
        Ok(Some(document))
    }

    async fn insert_document(&self, collection: Collection, document: Value) -> Result<Value> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_id);
        let document = with_id(document, collection, &id)?;

        sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection.as_str())
            .bind(&id)
            .bind(Json(&document))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert {} '{}'", collection, id))?;

        Ok(document)
    }

    async fn replace_document(&self, collection: Collection, id: &str, document: Value) -> Result<Option<Value>> {
        let document = with_id(document, collection, id)?;
        let result = sqlx::query(
            "UPDATE documents SET data = $3, updated_at = NOW() WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(Json(&document))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update {} '{}'", collection, id))?;

        Ok((result.rows_affected() > 0).then_some(document))
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete {} '{}'", collection, id))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_id_overrides_body_id() {
        let document = with_id(json!({"id": "stale", "name": "Ethanol"}), Collection::Compounds, "c1").unwrap();
        assert_eq!(document["id"], "c1");
        assert_eq!(document["name"], "Ethanol");

        let error = with_id(json!(["not", "an", "object"]), Collection::Compounds, "c1").unwrap_err();
        assert!(error.to_string().contains("must be JSON objects"));
    }
}
