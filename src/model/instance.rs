use crate::model::common::{lenient_f64, now_rfc3339, optional_date};
use crate::model::{generate_id, Id};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Active,
    UsedUp,
}

impl InstanceStatus {
    /// Status implied by a quantity: anything at or below zero is used up
    pub fn for_quantity(quantity: f64) -> Self {
        if quantity <= 0.0 {
            InstanceStatus::UsedUp
        } else {
            InstanceStatus::Active
        }
    }
}

/// One physical container or batch of a compound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundInstance {
    pub id: Id,
    #[serde(default)]
    pub compound_id: Id,
    #[serde(default)]
    pub batch_number: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, with = "optional_date")]
    pub received_date: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub opened_date: Option<NaiveDate>,
    /// Missing status in stored data is derived from the quantity on normalization
    #[serde(default)]
    pub status: Option<InstanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "now_rfc3339")]
    pub created_at: String,
    #[serde(default = "now_rfc3339")]
    pub updated_at: String,
}

impl CompoundInstance {
    pub fn status(&self) -> InstanceStatus {
        self.status
            .unwrap_or_else(|| InstanceStatus::for_quantity(self.quantity))
    }

    pub fn is_active(&self) -> bool {
        self.status() == InstanceStatus::Active
    }

    /// Set a new quantity and derive the status. Quantities at or below zero are
    /// stored as exactly zero with status `used_up`.
    pub fn set_quantity(&mut self, quantity: f64) {
        let status = InstanceStatus::for_quantity(quantity);
        self.quantity = if status == InstanceStatus::UsedUp {
            0.0
        } else {
            quantity
        };
        self.status = Some(status);
        self.updated_at = now_rfc3339();
    }

    /// `quantity <= 0` must coincide with `used_up`
    pub fn is_consistent(&self) -> bool {
        match self.status {
            Some(InstanceStatus::UsedUp) => self.quantity <= 0.0,
            Some(InstanceStatus::Active) => self.quantity > 0.0,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstance {
    pub compound_id: Id,
    #[serde(default)]
    pub batch_number: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, with = "optional_date")]
    pub received_date: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub opened_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl NewInstance {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.compound_id.trim().is_empty() {
            errors.push("Compound ID is required".to_string());
        }
        if self.location.trim().is_empty() {
            errors.push("Location is required".to_string());
        }
        if self.quantity < 0.0 {
            errors.push("Quantity must be a non-negative number".to_string());
        }
        if let (Some(received), Some(expiry)) = (self.received_date, self.expiry_date) {
            if expiry < received {
                errors.push("Expiry date cannot be before received date".to_string());
            }
        }
        errors
    }

    pub fn into_instance(self) -> CompoundInstance {
        let now = now_rfc3339();
        let mut instance = CompoundInstance {
            id: generate_id(),
            compound_id: self.compound_id,
            batch_number: self.batch_number,
            quantity: self.quantity,
            unit: self.unit,
            location: self.location.trim().to_string(),
            received_date: self.received_date,
            expiry_date: self.expiry_date,
            opened_date: self.opened_date,
            status: None,
            description: self.description,
            created_at: now.clone(),
            updated_at: now,
        };
        instance.set_quantity(self.quantity);
        instance
    }
}

/// Partial update for an instance. A quantity change re-derives the status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceUpdate {
    pub batch_number: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub location: Option<String>,
    #[serde(default, with = "optional_date")]
    pub received_date: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub opened_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl InstanceUpdate {
    pub fn apply_to(self, instance: &mut CompoundInstance) {
        if let Some(batch) = self.batch_number {
            instance.batch_number = batch;
        }
        if let Some(unit) = self.unit {
            instance.unit = unit;
        }
        if let Some(location) = self.location {
            instance.location = location.trim().to_string();
        }
        if self.received_date.is_some() {
            instance.received_date = self.received_date;
        }
        if self.expiry_date.is_some() {
            instance.expiry_date = self.expiry_date;
        }
        if self.opened_date.is_some() {
            instance.opened_date = self.opened_date;
        }
        if let Some(description) = self.description {
            instance.description = Some(description);
        }
        match self.quantity {
            Some(quantity) => instance.set_quantity(quantity),
            None => instance.updated_at = now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(quantity: f64) -> CompoundInstance {
        NewInstance {
            compound_id: "c1".to_string(),
            batch_number: "B-1".to_string(),
            quantity,
            unit: "g".to_string(),
            location: "Cabinet A".to_string(),
            received_date: None,
            expiry_date: None,
            opened_date: None,
            description: None,
        }
        .into_instance()
    }

    #[test]
    fn test_set_quantity_derives_status() {
        let mut inst = instance(10.0);
        assert_eq!(inst.status(), InstanceStatus::Active);

        inst.set_quantity(-3.0);
        assert_eq!(inst.quantity, 0.0);
        assert_eq!(inst.status(), InstanceStatus::UsedUp);
        assert!(inst.is_consistent());

        inst.set_quantity(4.5);
        assert_eq!(inst.status(), InstanceStatus::Active);
        assert!(inst.is_consistent());
    }

    #[test]
    fn test_empty_dates_deserialize_as_none() {
        let json = r#"{
            "id": "i1", "compoundId": "c1", "batchNumber": "B", "quantity": "25",
            "unit": "g", "location": "Shelf", "receivedDate": "", "expiryDate": "2026-01-31",
            "status": "active"
        }"#;
        let inst: CompoundInstance = serde_json::from_str(json).unwrap();
        assert_eq!(inst.quantity, 25.0);
        assert_eq!(inst.received_date, None);
        assert_eq!(inst.expiry_date, NaiveDate::from_ymd_opt(2026, 1, 31));
        assert_eq!(inst.status, Some(InstanceStatus::Active));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let inst = instance(0.0);
        let value = serde_json::to_value(&inst).unwrap();
        assert_eq!(value["status"], "used_up");
        assert_eq!(value["compoundId"], "c1");
    }

    #[test]
    fn test_new_instance_validation() {
        let request = NewInstance {
            compound_id: String::new(),
            batch_number: String::new(),
            quantity: -1.0,
            unit: "g".to_string(),
            location: String::new(),
            received_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            expiry_date: NaiveDate::from_ymd_opt(2025, 4, 1),
            opened_date: None,
            description: None,
        };
        assert_eq!(request.validate().len(), 4);
    }
}
