use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::logic::transaction_engine::replay_stock;
use crate::model::{Compound, CompoundInstance, InstanceStatus, Transaction};

/// Largest difference between a replayed and a stored quantity that still counts as equal
const REPLAY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    OrphanedInstance,
    MissingCompoundId,
    InconsistentStatus,
    NegativeQuantity,
    /// Stored quantity differs from the one replayed from the transaction log
    HistoryMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compound_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub valid: bool,
    pub instance_count: usize,
    pub compound_count: usize,
    pub issues: Vec<ConsistencyIssue>,
}

/// Report (never repair) data inconsistencies between compounds, instances
/// and the transaction log
pub fn validate_consistency(
    compounds: &[Compound],
    instances: &[CompoundInstance],
    transactions: &[Transaction],
) -> ConsistencyReport {
    let known: HashSet<&str> = compounds.iter().map(|c| c.id.as_str()).collect();
    let mut issues = Vec::new();

    for instance in instances {
        let compound_id = instance.compound_id.trim();
        if compound_id.is_empty() {
            issues.push(ConsistencyIssue {
                issue_type: IssueType::MissingCompoundId,
                instance_id: instance.id.clone(),
                compound_id: None,
                message: format!("Instance {} is missing compoundId", instance.id),
            });
        } else if !known.contains(compound_id) {
            issues.push(ConsistencyIssue {
                issue_type: IssueType::OrphanedInstance,
                instance_id: instance.id.clone(),
                compound_id: Some(compound_id.to_string()),
                message: format!(
                    "Instance {} references non-existent compound {}",
                    instance.id, compound_id
                ),
            });
        }

        if instance.quantity < 0.0 {
            issues.push(ConsistencyIssue {
                issue_type: IssueType::NegativeQuantity,
                instance_id: instance.id.clone(),
                compound_id: None,
                message: format!(
                    "Instance {} has negative quantity {}",
                    instance.id, instance.quantity
                ),
            });
        }

        let status = instance.status;
        if instance.quantity <= 0.0 && status != Some(InstanceStatus::UsedUp) {
            issues.push(ConsistencyIssue {
                issue_type: IssueType::InconsistentStatus,
                instance_id: instance.id.clone(),
                compound_id: None,
                message: format!(
                    "Instance {} has zero quantity but status is not 'used_up'",
                    instance.id
                ),
            });
        } else if instance.quantity > 0.0 && status != Some(InstanceStatus::Active) {
            issues.push(ConsistencyIssue {
                issue_type: IssueType::InconsistentStatus,
                instance_id: instance.id.clone(),
                compound_id: None,
                message: format!(
                    "Instance {} has stock but status is not 'active'",
                    instance.id
                ),
            });
        }

        if let Some(replayed) = replayed_quantity(instance, transactions) {
            if (replayed - instance.quantity).abs() > REPLAY_TOLERANCE {
                issues.push(ConsistencyIssue {
                    issue_type: IssueType::HistoryMismatch,
                    instance_id: instance.id.clone(),
                    compound_id: None,
                    message: format!(
                        "Instance {} holds {} but its transactions add up to {}",
                        instance.id, instance.quantity, replayed
                    ),
                });
            }
        }
    }

    ConsistencyReport {
        valid: issues.is_empty(),
        instance_count: instances.len(),
        compound_count: compounds.len(),
        issues,
    }
}

/// Quantity obtained by replaying the instance's transactions, oldest first,
/// from the quantity recorded before the first one. `None` without a usable history.
pub fn replayed_quantity(instance: &CompoundInstance, transactions: &[Transaction]) -> Option<f64> {
    let history: Vec<Transaction> = transactions
        .iter()
        .filter(|t| t.instance_id == instance.id)
        .sorted_by(|a, b| a.timestamp.cmp(&b.timestamp))
        .cloned()
        .collect();
    let initial = history.first()?.previous_quantity?;
    Some(replay_stock(initial, &history))
}

/// Does the stored instance differ from its normalized form?
pub fn needs_migration(instance: &CompoundInstance) -> bool {
    instance.quantity < 0.0 || !instance.is_consistent() || instance.location.trim() != instance.location
}

/// Fill a missing status, clamp negative quantities and enforce
/// `quantity <= 0 <=> used_up`. The compound reference is left untouched.
pub fn normalize_instance(instance: &CompoundInstance) -> CompoundInstance {
    let mut normalized = instance.clone();
    normalized.location = normalized.location.trim().to_string();
    let quantity = normalized.quantity.max(0.0);
    normalized.quantity = quantity;
    normalized.status = Some(InstanceStatus::for_quantity(quantity));
    normalized
}
