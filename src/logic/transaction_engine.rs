use crate::model::{
    generate_transaction_id, now_rfc3339, CompoundInstance, InstanceStatus, Transaction,
    TransactionRequest, TransactionType, UserContext,
};

/// A validated transaction request, ready to be applied to its instance
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTransaction {
    pub transaction_type: TransactionType,
    pub quantity: f64,
    pub original_quantity: f64,
    pub new_quantity: f64,
    pub new_status: InstanceStatus,
    /// Destination location for transfers
    pub destination: Option<String>,
}

/// Quantity an instance holds after applying an operation, before clamping
pub fn calculate_new_quantity(
    transaction_type: TransactionType,
    original: f64,
    quantity: f64,
) -> f64 {
    match transaction_type {
        TransactionType::Use | TransactionType::Waste => (original - quantity).max(0.0),
        TransactionType::Adjust => quantity,
        TransactionType::Transfer => original,
        TransactionType::Restock => original + quantity,
    }
}

/// Clamp a quantity and derive the status: anything at or below zero is
/// exactly `0` and `used_up`.
pub fn derive_status(quantity: f64) -> (f64, InstanceStatus) {
    match InstanceStatus::for_quantity(quantity) {
        InstanceStatus::UsedUp => (0.0, InstanceStatus::UsedUp),
        InstanceStatus::Active => (quantity, InstanceStatus::Active),
    }
}

/// Check every rule of a transaction request against the instance's current
/// quantity. All violations are collected; nothing is mutated.
pub fn validate_request(
    request: &TransactionRequest,
    current_quantity: f64,
) -> Result<PlannedTransaction, Vec<String>> {
    let mut errors = Vec::new();

    if request.instance_id.trim().is_empty() {
        errors.push("Instance ID is required for all transactions".to_string());
    }

    let transaction_type = TransactionType::parse(&request.transaction_type);
    if transaction_type.is_none() {
        errors.push(format!(
            "Unknown transaction type '{}'",
            request.transaction_type
        ));
    }

    let original = request
        .original_quantity
        .as_ref()
        .and_then(|q| q.parse())
        .unwrap_or(current_quantity);

    let quantity = request.quantity.as_ref().and_then(|q| q.parse());
    match (quantity, transaction_type) {
        (None, _) => errors.push("Quantity must be a valid number".to_string()),
        (Some(q), Some(TransactionType::Adjust)) if q < 0.0 => {
            errors.push("Adjusted quantity cannot be negative".to_string())
        }
        (Some(q), Some(t)) if t != TransactionType::Adjust && q <= 0.0 => {
            errors.push("Quantity must be greater than zero".to_string())
        }
        (Some(q), None) if q <= 0.0 => {
            errors.push("Quantity must be greater than zero".to_string())
        }
        _ => {}
    }

    if let (Some(q), Some(t)) = (quantity, transaction_type) {
        if t.is_consuming() && q > original {
            errors.push(format!(
                "Cannot {} {} (only {} available)",
                t, q, original
            ));
        }
    }

    let destination = request
        .location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string);
    if transaction_type == Some(TransactionType::Transfer) && destination.is_none() {
        errors.push("Destination location is required for transfers".to_string());
    }

    match (transaction_type, quantity) {
        (Some(transaction_type), Some(quantity)) if errors.is_empty() => {
            let (new_quantity, new_status) =
                derive_status(calculate_new_quantity(transaction_type, original, quantity));
            Ok(PlannedTransaction {
                transaction_type,
                quantity,
                original_quantity: original,
                new_quantity,
                new_status,
                destination,
            })
        }
        _ => Err(errors),
    }
}

/// The instance as it looks after the planned operation
pub fn apply_to_instance(instance: &CompoundInstance, plan: &PlannedTransaction) -> CompoundInstance {
    let mut updated = instance.clone();
    updated.set_quantity(plan.new_quantity);
    if plan.transaction_type == TransactionType::Transfer {
        if let Some(destination) = &plan.destination {
            updated.location = destination.clone();
        }
    }
    updated
}

/// Log entry for a planned operation, stamped with the acting user and the current time
pub fn build_transaction(
    instance: &CompoundInstance,
    plan: &PlannedTransaction,
    request: &TransactionRequest,
    user: &UserContext,
) -> Transaction {
    let is_transfer = plan.transaction_type == TransactionType::Transfer;
    Transaction {
        id: generate_transaction_id(),
        instance_id: instance.id.clone(),
        compound_id: request
            .compound_id
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| instance.compound_id.clone()),
        transaction_type: plan.transaction_type,
        quantity: plan.quantity,
        previous_quantity: Some(plan.original_quantity),
        new_quantity: Some(plan.new_quantity),
        unit: Some(instance.unit.clone()).filter(|u| !u.is_empty()),
        timestamp: now_rfc3339(),
        user_id: user.user_id.clone(),
        user_name: user.user_name.clone(),
        notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        location: if is_transfer { plan.destination.clone() } else { None },
        from_location: if is_transfer {
            Some(instance.location.clone())
        } else {
            None
        },
        updated_at: None,
    }
}

/// Recompute an instance quantity from its transaction history, oldest first.
/// Transfers do not change the quantity; the result never goes below zero.
pub fn replay_stock(initial: f64, transactions: &[Transaction]) -> f64 {
    let stock = transactions.iter().fold(initial, |stock, txn| {
        match txn.transaction_type {
            TransactionType::Use | TransactionType::Waste => stock - txn.quantity,
            TransactionType::Restock => stock + txn.quantity,
            TransactionType::Adjust => txn.quantity,
            TransactionType::Transfer => stock,
        }
    });
    stock.max(0.0)
}
