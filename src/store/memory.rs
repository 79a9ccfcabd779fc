use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use crate::model::{generate_id, ListParams, Page};
use crate::store::traits::{document_id, Collection, DocumentStore};

/// Process-local document store. Documents keep their insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .get(&collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(Vec::is_empty)
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn list_documents(&self, collection: Collection, params: &ListParams) -> Result<Page<Value>> {
        let documents = self
            .collections
            .read()
            .get(&collection)
            .cloned()
            .unwrap_or_default();
        Ok(params.apply(documents))
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.read();
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| document_id(d) == Some(id)))
            .cloned())
    }

    async fn insert_document(&self, collection: Collection, mut document: Value) -> Result<Value> {
        let object = document
            .as_object_mut()
            .ok_or_else(|| anyhow!("{} documents must be JSON objects", collection))?;
        let id = match object.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = generate_id();
                object.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut collections = self.collections.write();
        let docs = collections.entry(collection).or_default();
        if docs.iter().any(|d| document_id(d) == Some(id.as_str())) {
            return Err(anyhow!("{} document '{}' already exists", collection, id));
        }
        docs.push(document.clone());
        Ok(document)
    }

    async fn replace_document(&self, collection: Collection, id: &str, mut document: Value) -> Result<Option<Value>> {
        if let Some(object) = document.as_object_mut() {
            object.insert("id".to_string(), Value::String(id.to_string()));
        } else {
            return Err(anyhow!("{} documents must be JSON objects", collection));
        }

        let mut collections = self.collections.write();
        let slot = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|d| document_id(d) == Some(id)));
        Ok(slot.map(|existing| {
            *existing = document.clone();
            document
        }))
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<bool> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|d| document_id(d) != Some(id));
        Ok(docs.len() != before)
    }
}
