use thiserror::Error;

use crate::store::RemoteStoreError;

/// Failure of an inventory operation
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions: {0}")]
    Forbidden(String),

    #[error("Storage error: {0:#}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for InventoryError {
    fn from(error: anyhow::Error) -> Self {
        // A rejected remote session surfaces as 401, not as a storage failure
        match error.downcast_ref::<RemoteStoreError>() {
            Some(RemoteStoreError::Unauthorized) => InventoryError::Unauthorized,
            _ => InventoryError::Store(error),
        }
    }
}

impl InventoryError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        InventoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        InventoryError::Validation(vec![message.into()])
    }

    /// Individual messages carried by the error, for the `details` field of API errors
    pub fn details(&self) -> Vec<String> {
        match self {
            InventoryError::Validation(errors) => errors.clone(),
            _ => Vec::new(),
        }
    }
}

pub type InventoryResult<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_unauthorized_is_not_a_store_error() {
        let error: InventoryError = anyhow::Error::from(RemoteStoreError::Unauthorized).into();
        assert!(matches!(error, InventoryError::Unauthorized));

        let error: InventoryError = anyhow::anyhow!("connection refused").into();
        assert!(matches!(error, InventoryError::Store(_)));
    }

    #[test]
    fn test_validation_message_joins_all_rules() {
        let error = InventoryError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(error.to_string(), "Validation failed: a; b");
        assert_eq!(error.details().len(), 2);
    }
}
