use chrono::{DateTime, Months, NaiveDate};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::logic::units;
use crate::model::{Compound, CompoundInstance, Transaction, TransactionType};

pub const DEFAULT_EXPIRY_HORIZON_MONTHS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    /// At or below half the threshold
    LowStock,
    /// Above half the threshold but not above it
    Caution,
    Adequate,
}

pub fn stock_status(current: f64, threshold: f64) -> StockStatus {
    if current <= 0.0 {
        StockStatus::OutOfStock
    } else if current <= threshold * 0.5 {
        StockStatus::LowStock
    } else if current <= threshold {
        StockStatus::Caution
    } else {
        StockStatus::Adequate
    }
}

fn active_instances_of<'a>(
    instances: &'a [CompoundInstance],
    compound_id: &'a str,
) -> impl Iterator<Item = &'a CompoundInstance> + 'a {
    instances
        .iter()
        .filter(move |i| i.compound_id == compound_id && i.is_active())
}

/// Sum of the quantities of the compound's active instances, in their stored units
pub fn total_stock(instances: &[CompoundInstance], compound_id: &str) -> f64 {
    active_instances_of(instances, compound_id)
        .map(|i| i.quantity)
        .sum()
}

/// Total stock expressed in `unit`; instances whose unit cannot be converted are skipped
pub fn total_stock_in(instances: &[CompoundInstance], compound_id: &str, unit: &str) -> f64 {
    active_instances_of(instances, compound_id)
        .filter_map(|i| units::convert(i.quantity, &i.unit, unit))
        .sum()
}

pub fn is_low_stock(compound: &Compound, instances: &[CompoundInstance]) -> bool {
    total_stock(instances, &compound.id) < compound.threshold
}

/// Active instance with an expiry date within `horizon_months` of `today`.
/// Instances without an expiry date never expire.
pub fn is_expiring_soon(instance: &CompoundInstance, today: NaiveDate, horizon_months: u32) -> bool {
    if !instance.is_active() {
        return false;
    }
    let Some(expiry) = instance.expiry_date else {
        return false;
    };
    let horizon = today
        .checked_add_months(Months::new(horizon_months))
        .unwrap_or(NaiveDate::MAX);
    expiry <= horizon
}

pub fn expiring_instances<'a>(
    instances: &'a [CompoundInstance],
    today: NaiveDate,
    horizon_months: u32,
) -> Vec<&'a CompoundInstance> {
    instances
        .iter()
        .filter(|i| is_expiring_soon(i, today, horizon_months))
        .sorted_by_key(|i| i.expiry_date)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundStock {
    pub compound_id: String,
    pub name: String,
    pub unit: String,
    pub total_stock: f64,
    pub threshold: f64,
    pub is_low_stock: bool,
    pub status: StockStatus,
}

pub fn compound_stock(compound: &Compound, instances: &[CompoundInstance]) -> CompoundStock {
    let total = total_stock(instances, &compound.id);
    CompoundStock {
        compound_id: compound.id.clone(),
        name: compound.name.clone(),
        unit: compound.unit.clone(),
        total_stock: total,
        threshold: compound.threshold,
        is_low_stock: total < compound.threshold,
        status: stock_status(total, compound.threshold),
    }
}

pub fn low_stock(compounds: &[Compound], instances: &[CompoundInstance]) -> Vec<CompoundStock> {
    compounds
        .iter()
        .map(|c| compound_stock(c, instances))
        .filter(|s| s.is_low_stock)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub total_instances: usize,
    pub total_quantity: f64,
    pub locations: Vec<String>,
    pub expiring_soon: usize,
}

pub fn instance_summary(
    instances: &[CompoundInstance],
    compound_id: &str,
    today: NaiveDate,
) -> InstanceSummary {
    let active: Vec<&CompoundInstance> = active_instances_of(instances, compound_id).collect();
    InstanceSummary {
        total_instances: active.len(),
        total_quantity: active.iter().map(|i| i.quantity).sum(),
        locations: active.iter().map(|i| i.location.clone()).unique().collect(),
        expiring_soon: active
            .iter()
            .filter(|i| is_expiring_soon(i, today, DEFAULT_EXPIRY_HORIZON_MONTHS))
            .count(),
    }
}

/// Distinct non-empty locations of all instances, sorted
pub fn all_locations(instances: &[CompoundInstance]) -> Vec<String> {
    instances
        .iter()
        .map(|i| i.location.trim())
        .filter(|l| !l.is_empty())
        .unique()
        .sorted()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatistics {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub total_quantity_used: f64,
    pub total_quantity_added: f64,
    pub date_range: DateRange,
}

pub fn statistics(transactions: &[Transaction]) -> TransactionStatistics {
    let by_type = transactions
        .iter()
        .counts_by(|t| t.transaction_type.as_str().to_string())
        .into_iter()
        .collect();

    let total_quantity_used = transactions
        .iter()
        .filter(|t| t.transaction_type.is_consuming())
        .map(|t| t.quantity)
        .sum();
    let total_quantity_added = transactions
        .iter()
        .filter(|t| t.transaction_type == TransactionType::Restock)
        .map(|t| t.quantity)
        .sum();

    let timestamps = transactions
        .iter()
        .filter_map(|t| DateTime::parse_from_rfc3339(&t.timestamp).ok().map(|dt| (dt, &t.timestamp)));
    let (earliest, latest) = match timestamps.minmax_by_key(|(dt, _)| *dt).into_option() {
        Some(((_, first), (_, last))) => (Some(first.clone()), Some(last.clone())),
        None => (None, None),
    };

    TransactionStatistics {
        total: transactions.len(),
        by_type,
        total_quantity_used,
        total_quantity_added,
        date_range: DateRange { earliest, latest },
    }
}
