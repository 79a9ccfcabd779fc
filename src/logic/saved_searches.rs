use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{InventoryError, InventoryResult};
use crate::model::{generate_id, now_rfc3339, SaveSearchRequest, SavedSearch};

pub const MAX_SAVED_SEARCHES: usize = 20;
pub const MAX_SEARCH_HISTORY: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSearches {
    #[serde(default)]
    saved: Vec<SavedSearch>,
    #[serde(default)]
    history: Vec<SavedSearch>,
}

/// Per-user saved searches and recently loaded searches, one JSON file per user
#[derive(Debug)]
pub struct SavedSearchStore {
    directory: PathBuf,
    write_lock: Mutex<()>,
}

/// File names are digests of the user id so distinct ids never share a file
fn file_name_for(user_id: &str) -> String {
    format!("{}.json", hex::encode(Sha256::digest(user_id.as_bytes())))
}

impl SavedSearchStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.directory.join(file_name_for(user_id))
    }

    async fn read(&self, user_id: &str) -> Result<UserSearches> {
        let path = self.path_for(user_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse saved searches in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserSearches::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write(&self, user_id: &str, searches: &UserSearches) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("Failed to create {}", self.directory.display()))?;
        let path = self.path_for(user_id);
        let json = serde_json::to_vec_pretty(searches)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub async fn list_saved(&self, user_id: &str) -> InventoryResult<Vec<SavedSearch>> {
        Ok(self.read(user_id).await?.saved)
    }

    pub async fn history(&self, user_id: &str) -> InventoryResult<Vec<SavedSearch>> {
        Ok(self.read(user_id).await?.history)
    }

    /// Save a search under a name. A search with the same name is replaced and
    /// the newest entry goes first; the list is capped.
    pub async fn save(&self, user_id: &str, request: SaveSearchRequest) -> InventoryResult<SavedSearch> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(InventoryError::validation("Search name is required"));
        }

        let _guard = self.write_lock.lock().await;
        let mut searches = self.read(user_id).await?;
        let saved = SavedSearch {
            id: generate_id(),
            name: name.clone(),
            summary: request.query.summary(),
            query: request.query,
            created_at: now_rfc3339(),
            accessed_at: None,
        };
        searches.saved.retain(|s| s.name != name);
        searches.saved.insert(0, saved.clone());
        searches.saved.truncate(MAX_SAVED_SEARCHES);
        self.write(user_id, &searches).await?;

        log::info!("User {} saved search '{}'", user_id, name);
        Ok(saved)
    }

    pub async fn delete(&self, user_id: &str, search_id: &str) -> InventoryResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut searches = self.read(user_id).await?;
        let before = searches.saved.len();
        searches.saved.retain(|s| s.id != search_id);
        if searches.saved.len() == before {
            return Err(InventoryError::not_found("Saved search", search_id));
        }
        self.write(user_id, &searches).await?;
        Ok(())
    }

    /// Fetch a saved search and push it onto the user's history
    pub async fn load(&self, user_id: &str, search_id: &str) -> InventoryResult<SavedSearch> {
        let _guard = self.write_lock.lock().await;
        let mut searches = self.read(user_id).await?;
        let mut loaded = searches
            .saved
            .iter()
            .find(|s| s.id == search_id)
            .cloned()
            .ok_or_else(|| InventoryError::not_found("Saved search", search_id))?;
        loaded.accessed_at = Some(now_rfc3339());

        searches.history.retain(|h| h.id != loaded.id);
        searches.history.insert(0, loaded.clone());
        searches.history.truncate(MAX_SEARCH_HISTORY);
        self.write(user_id, &searches).await?;
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SearchQuery;

    fn request(name: &str) -> SaveSearchRequest {
        SaveSearchRequest {
            name: name.to_string(),
            query: SearchQuery::Simple {
                query: name.to_lowercase(),
                regex: false,
            },
        }
    }

    #[tokio::test]
    async fn test_save_dedups_by_name_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let store = SavedSearchStore::new(dir.path());

        for i in 0..25 {
            store.save("u1", request(&format!("search {}", i))).await.unwrap();
        }
        store.save("u1", request("search 10")).await.unwrap();

        let saved = store.list_saved("u1").await.unwrap();
        assert_eq!(saved.len(), MAX_SAVED_SEARCHES);
        assert_eq!(saved[0].name, "search 10");
        assert_eq!(saved.iter().filter(|s| s.name == "search 10").count(), 1);
        assert_eq!(saved[0].summary, "Text search: \"search 10\"");
        assert!(store.list_saved("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_user_ids_do_not_share_files() {
        assert_ne!(file_name_for("a.b"), file_name_for("a_b"));
        assert_ne!(file_name_for("a/b"), file_name_for("a_b"));
        assert!(!file_name_for("../etc/passwd").contains('/'));

        let dir = tempfile::tempdir().unwrap();
        let store = SavedSearchStore::new(dir.path());
        store.save("a.b", request("dotted")).await.unwrap();
        store.save("a_b", request("underscored")).await.unwrap();

        let dotted = store.list_saved("a.b").await.unwrap();
        assert_eq!(dotted.len(), 1);
        assert_eq!(dotted[0].name, "dotted");
        assert_eq!(store.list_saved("a_b").await.unwrap()[0].name, "underscored");
    }

    #[tokio::test]
    async fn test_load_pushes_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = SavedSearchStore::new(dir.path());
        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(store.save("u1", request(&format!("s{}", i))).await.unwrap().id);
        }
        for id in &ids {
            store.load("u1", id).await.unwrap();
        }
        store.load("u1", &ids[3]).await.unwrap();

        let history = store.history("u1").await.unwrap();
        assert_eq!(history.len(), MAX_SEARCH_HISTORY);
        assert_eq!(history[0].id, ids[3]);
        assert!(history[0].accessed_at.is_some());
        assert_eq!(history.iter().filter(|h| h.id == ids[3]).count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_blank_name_and_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = SavedSearchStore::new(dir.path());
        assert!(matches!(
            store.save("u1", request("  ")).await,
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            store.delete("u1", "missing").await,
            Err(InventoryError::NotFound { .. })
        ));
    }
}
