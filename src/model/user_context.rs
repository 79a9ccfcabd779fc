use crate::model::Id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Visitor,
}

/// Stored user account. The password digest is never sent back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub password_hash: String,
}

/// User as exposed by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Id,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub password: String,
}

/// Acting user attached to every authenticated request, used for audit stamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
}

impl UserContext {
    pub fn new(user_id: &str, user_name: &str, role: Role) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            role,
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self::new(&user.id, &user.name, user.role)
    }

    /// Context for internal operations (seeding, migrations)
    pub fn system() -> Self {
        Self::new("system", "System", Role::Admin)
    }

    /// Context used when anonymous access is enabled for local development
    pub fn default_user() -> Self {
        Self::new("dev-user", "Development User", Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::default_user()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_user_hides_password_hash() {
        let user = User {
            id: "u1".to_string(),
            username: "admin".to_string(),
            name: "Lab Admin".to_string(),
            email: None,
            role: Role::Admin,
            password_hash: "secret-digest".to_string(),
        };
        let value = serde_json::to_value(PublicUser::from(&user)).unwrap();
        assert!(value.get("passwordHash").is_none());
        assert_eq!(value["role"], "admin");
    }

    #[test]
    fn test_user_context_roles() {
        let visitor = UserContext::new("u2", "Guest", Role::Visitor);
        assert!(!visitor.is_admin());
        assert!(UserContext::system().is_admin());
    }
}
