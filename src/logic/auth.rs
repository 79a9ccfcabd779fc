use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};
use crate::logic::inventory::Inventory;
use crate::model::{LoginRequest, LoginResponse, PublicUser, User, UserContext};
use crate::store::Store;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// SHA-256 hex digest of a password
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn verify_password(password: &str, digest: &str) -> bool {
    hash_password(password).eq_ignore_ascii_case(digest.trim())
}

fn new_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct IssuedToken {
    user: UserContext,
    expires_at: Instant,
}

/// In-memory registry of bearer tokens
#[derive(Debug)]
pub struct AuthService {
    tokens: RwLock<HashMap<String, IssuedToken>>,
    ttl: Duration,
}

impl AuthService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> String {
        let token = new_token();
        self.tokens.write().insert(
            token.clone(),
            IssuedToken {
                user: UserContext::from_user(user),
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// User behind a token; expired tokens are dropped
    pub fn resolve(&self, token: &str) -> Option<UserContext> {
        let issued = self.tokens.read().get(token).cloned()?;
        if issued.expires_at <= Instant::now() {
            self.tokens.write().remove(token);
            return None;
        }
        Some(issued.user)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, issued| issued.expires_at > now);
        before - tokens.len()
    }

    /// Check credentials against the user collection and issue a token
    pub async fn login<S: Store>(
        &self,
        inventory: &Inventory<S>,
        request: LoginRequest,
    ) -> InventoryResult<LoginResponse> {
        let user = inventory.find_user(request.username.trim()).await?;
        let Some(user) = user.filter(|u| verify_password(&request.password, &u.password_hash)) else {
            log::warn!("Failed login for '{}'", request.username);
            return Err(InventoryError::Unauthorized);
        };

        let purged = self.purge_expired();
        if purged > 0 {
            log::debug!("Purged {} expired tokens", purged);
        }
        log::info!("User '{}' logged in", user.username);
        Ok(LoginResponse {
            access_token: self.issue(&user),
            user: PublicUser::from(&user),
        })
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::inventory::DEFAULT_CACHE_TTL;
    use crate::model::Role;
    use crate::store::{MemoryStore, UserStore};
    use std::sync::Arc;

    fn user(username: &str, password: &str, role: Role) -> User {
        User {
            id: format!("id-{}", username),
            username: username.to_string(),
            name: username.to_uppercase(),
            email: None,
            role,
            password_hash: hash_password(password),
        }
    }

    #[test]
    fn test_password_digest() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(verify_password("abc", &hash_password("abc")));
        assert!(!verify_password("abd", &hash_password("abc")));
    }

    #[test]
    fn test_issue_resolve_revoke() {
        let auth = AuthService::default();
        let token = auth.issue(&user("ana", "pw", Role::Visitor));
        assert_eq!(token.len(), 64);
        let context = auth.resolve(&token).unwrap();
        assert_eq!(context.user_name, "ANA");
        assert!(!context.is_admin());

        assert!(auth.revoke(&token));
        assert!(auth.resolve(&token).is_none());
        assert!(auth.resolve("unknown").is_none());
    }

    #[test]
    fn test_expired_tokens_are_rejected() {
        let auth = AuthService::new(Duration::ZERO);
        let token = auth.issue(&user("ana", "pw", Role::Admin));
        assert!(auth.resolve(&token).is_none());
        auth.issue(&user("bob", "pw", Role::Admin));
        assert_eq!(auth.purge_expired(), 1);
    }

    #[tokio::test]
    async fn test_login() {
        let store = MemoryStore::new();
        store.insert_user(&user("admin", "admin123", Role::Admin)).await.unwrap();
        let inventory = Inventory::new(Arc::new(store), DEFAULT_CACHE_TTL);
        let auth = AuthService::default();

        let response = auth
            .login(
                &inventory,
                LoginRequest {
                    username: "admin".to_string(),
                    password: "admin123".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.user.role, Role::Admin);
        assert!(auth.resolve(&response.access_token).is_some());

        let wrong = auth
            .login(
                &inventory,
                LoginRequest {
                    username: "admin".to_string(),
                    password: "nope".to_string(),
                },
            )
            .await;
        assert!(matches!(wrong, Err(InventoryError::Unauthorized)));
    }
}
