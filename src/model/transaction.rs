use crate::model::common::{lenient_f64, NumberInput};
use crate::model::Id;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Use,
    /// Legacy type: still present in stored data, still applied
    Restock,
    Adjust,
    Transfer,
    Waste,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Use,
        TransactionType::Restock,
        TransactionType::Adjust,
        TransactionType::Transfer,
        TransactionType::Waste,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "use" => Some(TransactionType::Use),
            "restock" => Some(TransactionType::Restock),
            "adjust" => Some(TransactionType::Adjust),
            "transfer" => Some(TransactionType::Transfer),
            "waste" => Some(TransactionType::Waste),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Use => "use",
            TransactionType::Restock => "restock",
            TransactionType::Adjust => "adjust",
            TransactionType::Transfer => "transfer",
            TransactionType::Waste => "waste",
        }
    }

    /// Types that remove stock from the instance
    pub fn is_consuming(&self) -> bool {
        matches!(self, TransactionType::Use | TransactionType::Waste)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable log entry for an operation applied to an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Id,
    pub instance_id: Id,
    #[serde(default)]
    pub compound_id: Id,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(deserialize_with = "lenient_f64")]
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Destination location (transfers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Request to apply an operation to an instance. `quantity` may arrive as a
/// number or a numeric string; `type` is kept raw so unknown values can be
/// reported alongside every other violated rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub compound_id: Option<Id>,
    #[serde(rename = "type", default)]
    pub transaction_type: String,
    #[serde(default)]
    pub quantity: Option<NumberInput>,
    /// Quantity the caller saw before the operation; defaults to the instance's current quantity
    #[serde(default)]
    pub original_quantity: Option<NumberInput>,
    /// Destination location for transfers
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransactionRequest {
    pub fn new(instance_id: &str, transaction_type: TransactionType, quantity: f64) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            transaction_type: transaction_type.as_str().to_string(),
            quantity: Some(NumberInput::Number(quantity)),
            ..Default::default()
        }
    }

    pub fn with_original_quantity(mut self, original: f64) -> Self {
        self.original_quantity = Some(NumberInput::Number(original));
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
}

/// Administrative edit of a logged transaction
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub quantity: Option<f64>,
    pub notes: Option<String>,
    pub location: Option<String>,
}
