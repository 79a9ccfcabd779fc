use crate::logic::auth::hash_password;
use crate::model::{
    now_rfc3339, parse_date, Compound, CompoundInstance, Id, InstanceStatus, ListParams, Role,
    Transaction, TransactionType, User,
};
use crate::store::traits::{CompoundStore, InstanceStore, Store, TransactionStore, UserStore};
use anyhow::Result;

/// Compound with a fixed id so instances can refer to it
fn create_seed_compound(
    id: &str,
    name: &str,
    cas_number: &str,
    hazard_class: &str,
    supplier: &str,
    unit: &str,
    threshold: f64,
) -> Compound {
    let now = now_rfc3339();
    Compound {
        id: id.to_string(),
        name: name.to_string(),
        cas_number: Some(cas_number.to_string()),
        hazard_class: hazard_class.to_string(),
        supplier: Some(supplier.to_string()),
        synonyms: None,
        unit: unit.to_string(),
        threshold,
        description: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[allow(clippy::too_many_arguments)]
fn create_seed_instance(
    id: &str,
    compound_id: &str,
    batch_number: &str,
    quantity: f64,
    unit: &str,
    location: &str,
    received: &str,
    expiry: Option<&str>,
) -> CompoundInstance {
    let now = now_rfc3339();
    CompoundInstance {
        id: id.to_string(),
        compound_id: compound_id.to_string(),
        batch_number: batch_number.to_string(),
        quantity,
        unit: unit.to_string(),
        location: location.to_string(),
        received_date: parse_date(received),
        expiry_date: expiry.and_then(parse_date),
        opened_date: None,
        status: Some(InstanceStatus::for_quantity(quantity)),
        description: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn create_seed_user(id: &str, username: &str, name: &str, role: Role, password: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        name: name.to_string(),
        email: Some(format!("{}@lab.local", username)),
        role,
        password_hash: hash_password(password),
    }
}

/// Load demo users and a small chemical catalog. Collections that already
/// hold data are left alone.
pub async fn load_seed_data<S: Store>(store: &S) -> Result<()> {
    if store.list_users().await?.is_empty() {
        load_users(store).await?;
    } else {
        log::info!("Users already present, skipping user seed");
    }

    let existing = store.list_compounds(&ListParams::default().limited(1)).await?;
    if existing.total > 0 {
        log::info!("Compounds already present, skipping catalog seed");
        return Ok(());
    }
    load_catalog(store).await?;
    Ok(())
}

async fn load_users<S: Store>(store: &S) -> Result<()> {
    let users = [
        create_seed_user("user-admin", "admin", "Lab Administrator", Role::Admin, "admin123"),
        create_seed_user("user-visitor", "visitor", "Visiting Researcher", Role::Visitor, "visitor123"),
    ];
    for user in &users {
        store.insert_user(user).await?;
    }
    log::info!("Seeded {} users", users.len());
    Ok(())
}

async fn load_catalog<S: Store>(store: &S) -> Result<()> {
    let compounds = [
        create_seed_compound("cmp-ethanol", "Ethanol", "64-17-5", "Flammable", "Sigma-Aldrich", "mL", 1000.0),
        create_seed_compound("cmp-acetone", "Acetone", "67-64-1", "Flammable, Irritant", "Merck", "mL", 500.0),
        create_seed_compound("cmp-nacl", "Sodium chloride", "7647-14-5", "", "Fisher Scientific", "g", 500.0),
        create_seed_compound("cmp-hcl", "Hydrochloric acid", "7647-01-0", "Corrosive", "Sigma-Aldrich", "mL", 250.0),
        create_seed_compound("cmp-methanol", "Methanol", "67-56-1", "Flammable/Toxic", "Merck", "L", 2.0),
    ];
    for compound in &compounds {
        store.insert_compound(compound).await?;
    }

    let instances = [
        create_seed_instance("inst-eth-1", "cmp-ethanol", "ETH-2024-01", 750.0, "mL", "Flammables Cabinet", "2024-01-15", Some("2026-01-15")),
        create_seed_instance("inst-eth-2", "cmp-ethanol", "ETH-2024-07", 500.0, "mL", "Flammables Cabinet", "2024-07-02", Some("2026-07-02")),
        create_seed_instance("inst-ace-1", "cmp-acetone", "ACE-2024-03", 200.0, "mL", "Flammables Cabinet", "2024-03-10", Some("2025-09-10")),
        create_seed_instance("inst-nacl-1", "cmp-nacl", "NACL-2023-11", 250.0, "g", "Shelf A", "2023-11-20", None),
        create_seed_instance("inst-hcl-1", "cmp-hcl", "HCL-2024-05", 0.0, "mL", "Acid Cabinet", "2024-05-05", Some("2026-05-05")),
        create_seed_instance("inst-hcl-2", "cmp-hcl", "HCL-2024-09", 400.0, "mL", "Acid Cabinet", "2024-09-12", Some("2026-09-12")),
        create_seed_instance("inst-meoh-1", "cmp-methanol", "MEOH-2024-02", 1.5, "L", "Flammables Cabinet", "2024-02-28", Some("2026-02-28")),
    ];
    for instance in &instances {
        store.insert_instance(instance).await?;
    }

    let history: [(&str, &str, TransactionType, f64, f64); 2] = [
        ("txn_seed_hcl", "inst-hcl-1", TransactionType::Use, 500.0, 500.0),
        ("txn_seed_eth", "inst-eth-1", TransactionType::Use, 250.0, 1000.0),
    ];
    for (id, instance_id, transaction_type, quantity, previous) in history {
        let Some(instance) = instances.iter().find(|i| i.id == instance_id) else {
            continue;
        };
        store
            .insert_transaction(&seed_transaction(id, instance, transaction_type, quantity, previous))
            .await?;
    }

    log::info!(
        "Seeded {} compounds, {} instances, {} transactions",
        compounds.len(),
        instances.len(),
        history.len()
    );
    Ok(())
}

fn seed_transaction(
    id: &str,
    instance: &CompoundInstance,
    transaction_type: TransactionType,
    quantity: f64,
    previous: f64,
) -> Transaction {
    let id: Id = id.to_string();
    Transaction {
        id,
        instance_id: instance.id.clone(),
        compound_id: instance.compound_id.clone(),
        transaction_type,
        quantity,
        previous_quantity: Some(previous),
        new_quantity: Some(instance.quantity),
        unit: Some(instance.unit.clone()),
        timestamp: now_rfc3339(),
        user_id: "system".to_string(),
        user_name: "System".to_string(),
        notes: Some("Initial stock history".to_string()),
        location: None,
        from_location: None,
        updated_at: None,
    }
}
