use crate::model::common::lenient_f64;
use crate::model::Id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    /// Counted, but a non-zero discrepancy has not been resolved yet
    Unverified,
    Verified,
    /// Confirmed true difference between counted and expected quantity
    Discrepancy,
    NotFound,
}

impl CountStatus {
    /// Verified or otherwise resolved
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CountStatus::Unverified)
    }
}

/// How a non-zero discrepancy is resolved when it is recorded or verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyResolution {
    /// The difference is real; record it as a discrepancy
    Confirm,
    /// The difference is accepted as counting noise; mark verified
    Accept,
}

/// An instance expected at one of the session's locations when the session started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedInstance {
    pub instance_id: Id,
    pub compound_id: Id,
    pub location: String,
    pub expected_quantity: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountRecord {
    pub instance_id: Id,
    #[serde(default)]
    pub compound_id: Id,
    pub location: String,
    pub expected_quantity: f64,
    pub counted_quantity: f64,
    pub discrepancy: f64,
    pub status: CountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub counted_by: String,
    pub counted_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBreakdown {
    pub location: String,
    pub total_items: usize,
    pub counted_items: usize,
    pub verified_items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedInstance {
    pub instance_id: Id,
    pub from_location: String,
    pub to_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryCountSession {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub locations: Vec<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub expected_instances: Vec<ExpectedInstance>,
    #[serde(default)]
    pub location_breakdown: Vec<LocationBreakdown>,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub counted_items: usize,
    #[serde(default)]
    pub verified_items: usize,
    #[serde(default)]
    pub counts: Vec<CountRecord>,
    #[serde(default)]
    pub new_instances: Vec<Id>,
    #[serde(default)]
    pub moved_instances: Vec<MovedInstance>,
    #[serde(default)]
    pub notes: String,
    pub start_date: String,
    #[serde(default)]
    pub completed_date: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_by_name: String,
    #[serde(default)]
    pub completed_by: Option<String>,
}

impl InventoryCountSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn count_for(&self, instance_id: &str) -> Option<&CountRecord> {
        self.counts.iter().find(|c| c.instance_id == instance_id)
    }

    pub fn expected(&self, instance_id: &str) -> Option<&ExpectedInstance> {
        self.expected_instances
            .iter()
            .find(|e| e.instance_id == instance_id)
    }

    pub fn covers_location(&self, location: &str) -> bool {
        self.locations.iter().any(|l| l == location)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCountSession {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// Editable session header fields
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountSessionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountEntry {
    pub instance_id: Id,
    #[serde(deserialize_with = "lenient_f64", default)]
    pub counted_quantity: f64,
    /// Location the instance was physically found at, when different from the snapshot
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub resolution: Option<DiscrepancyResolution>,
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CountEntry {
    pub fn counted(instance_id: &str, quantity: f64) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            counted_quantity: quantity,
            location: None,
            resolution: None,
            not_found: false,
            notes: None,
        }
    }

    pub fn with_resolution(mut self, resolution: DiscrepancyResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn missing(instance_id: &str) -> Self {
        Self {
            not_found: true,
            ..Self::counted(instance_id, 0.0)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub resolution: DiscrepancyResolution,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationProgress {
    pub location: String,
    pub total_items: usize,
    pub counted_items: usize,
    pub verified_items: usize,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub total_items: usize,
    pub counted_items: usize,
    pub verified_items: usize,
    pub progress: f64,
    pub locations: Vec<LocationProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStatus {
    pub can_complete: bool,
    pub total_instances: usize,
    pub counted_instances: usize,
    pub verified_instances: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
