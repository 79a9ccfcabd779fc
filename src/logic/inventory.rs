use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::{InventoryError, InventoryResult};
use crate::logic::auth::hash_password;
use crate::logic::consistency::{self, ConsistencyReport};
use crate::logic::count_session::{self, DiscrepancyReport};
use crate::logic::search::{self, CompoundView};
use crate::logic::stock::{self, CompoundStock, InstanceSummary, TransactionStatistics};
use crate::logic::transaction_engine;
use crate::logic::units;
use crate::model::{
    is_valid_cas_number, now_rfc3339, CompletionStatus, Compound, CompoundInstance,
    CompoundUpdate, CountEntry, CountRecord, CountSessionUpdate, DiscrepancyResolution,
    InstanceUpdate, InventoryCountSession, ListParams, NewCompound, NewCountSession, NewInstance,
    NewUser, Page, PublicUser, SearchQuery, SessionProgress, Transaction, TransactionRequest,
    TransactionType, TransactionUpdate, User, UserContext,
};
use crate::store::{
    CacheSnapshot, CompoundStore, CountSessionStore, InstanceStore, InventoryCache,
    InventoryEvent, Store, TransactionStore, UndoLog, UserStore,
};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Result of applying a transaction: the log entry and the instance after the change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTransaction {
    pub transaction: Transaction,
    pub instance: CompoundInstance,
}

/// Stock figures and instance summary of one compound
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReport {
    #[serde(flatten)]
    pub stock: CompoundStock,
    pub summary: InstanceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted: Option<ConvertedStock>,
}

/// Total stock re-expressed in a requested unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedStock {
    pub unit: String,
    pub total_stock: f64,
}

/// Shared inventory repository: a write-through cache over a document store.
///
/// Every mutation is applied to the cache first and recorded in an [`UndoLog`].
/// When the store write fails the cache is restored, an authoritative reload is
/// attempted and the original error is returned. Nothing is retried.
pub struct Inventory<S: Store> {
    store: Arc<S>,
    cache: InventoryCache,
}

fn page_of<T: Serialize>(items: &[T], params: &ListParams) -> InventoryResult<Page<Value>> {
    let documents = items
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .context("Failed to serialize cached records")?;
    Ok(params.apply(documents))
}

fn require_found(found: bool, entity: &'static str, id: &str) -> InventoryResult<()> {
    if found {
        Ok(())
    } else {
        Err(InventoryError::not_found(entity, id))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl<S: Store> Inventory<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            cache: InventoryCache::new(ttl),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
        self.cache.subscribe()
    }

    /// Replace the cache with the store's current collections
    pub async fn load(&self) -> InventoryResult<()> {
        let all = ListParams::default();
        let (compounds, instances, transactions, sessions) = tokio::try_join!(
            self.store.list_compounds(&all),
            self.store.list_instances(&all),
            self.store.list_transactions(&all),
            self.store.list_sessions(&all),
        )?;
        log::info!(
            "Loaded {} compounds, {} instances, {} transactions, {} count sessions",
            compounds.total,
            instances.total,
            transactions.total,
            sessions.total
        );
        self.cache.replace_all(CacheSnapshot {
            compounds: compounds.items,
            instances: instances.items,
            transactions: transactions.items,
            sessions: sessions.items,
        });
        Ok(())
    }

    pub async fn ensure_loaded(&self) -> InventoryResult<()> {
        if !self.cache.is_fresh() {
            self.load().await?;
        }
        Ok(())
    }

    /// Run a store write for changes already applied to the cache
    async fn persist<F>(&self, undo: UndoLog, write: F) -> InventoryResult<()>
    where
        F: Future<Output = InventoryResult<()>>,
    {
        match write.await {
            Ok(()) => {
                undo.commit();
                Ok(())
            }
            Err(error) => {
                log::error!("Store write failed: {}", error);
                undo.restore(&self.cache);
                if let Err(reload) = self.load().await {
                    log::error!("Reload after failed write also failed: {}", reload);
                    self.cache.invalidate();
                }
                Err(error)
            }
        }
    }

    // ---- compounds -------------------------------------------------------

    pub async fn list_compounds(&self, params: &ListParams) -> InventoryResult<Page<Value>> {
        self.ensure_loaded().await?;
        page_of(&self.cache.compounds(), params)
    }

    pub async fn compounds(&self) -> InventoryResult<Vec<Compound>> {
        self.ensure_loaded().await?;
        Ok(self.cache.compounds())
    }

    pub async fn get_compound(&self, id: &str) -> InventoryResult<Compound> {
        self.ensure_loaded().await?;
        self.cache
            .compound(id)
            .ok_or_else(|| InventoryError::not_found("Compound", id))
    }

    fn duplicate_cas(&self, cas: Option<&str>, except: Option<&str>) -> Option<String> {
        let cas = cas.map(str::trim).filter(|c| !c.is_empty())?;
        self.cache
            .compounds()
            .iter()
            .filter(|c| Some(c.id.as_str()) != except)
            .any(|c| c.cas_number.as_deref().map(str::trim) == Some(cas))
            .then(|| format!("A compound with CAS number {} already exists", cas))
    }

    pub async fn create_compound(&self, request: NewCompound) -> InventoryResult<Compound> {
        self.ensure_loaded().await?;
        let mut errors = request.validate();
        errors.extend(self.duplicate_cas(request.cas_number.as_deref(), None));
        if !errors.is_empty() {
            return Err(InventoryError::Validation(errors));
        }

        let compound = request.into_compound();
        let mut undo = UndoLog::new();
        undo.compound(&compound.id, None);
        self.cache.put_compound(compound.clone());
        self.persist(undo, async {
            self.store.insert_compound(&compound).await?;
            Ok(())
        })
        .await?;

        log::info!("Created compound '{}' ({})", compound.name, compound.id);
        self.cache
            .notify(InventoryEvent::CompoundChanged { id: compound.id.clone() });
        Ok(compound)
    }

    pub async fn update_compound(&self, id: &str, update: CompoundUpdate) -> InventoryResult<Compound> {
        let previous = self.get_compound(id).await?;
        let mut compound = previous.clone();
        update.apply_to(&mut compound);

        let mut errors = Vec::new();
        if compound.name.is_empty() {
            errors.push("Compound name is required".to_string());
        }
        if let Some(cas) = compound.cas_number.as_deref() {
            if !is_valid_cas_number(cas.trim()) {
                errors.push(format!("Invalid CAS number format: {}", cas));
            }
        }
        if compound.threshold < 0.0 {
            errors.push("Threshold must be a non-negative number".to_string());
        }
        errors.extend(self.duplicate_cas(compound.cas_number.as_deref(), Some(id)));
        if !errors.is_empty() {
            return Err(InventoryError::Validation(errors));
        }

        let mut undo = UndoLog::new();
        undo.compound(id, Some(previous));
        self.cache.put_compound(compound.clone());
        self.persist(undo, async {
            let found = self.store.replace_compound(&compound).await?;
            require_found(found, "Compound", id)
        })
        .await?;

        self.cache
            .notify(InventoryEvent::CompoundChanged { id: id.to_string() });
        Ok(compound)
    }

    /// Delete the catalog entry. Its instances are left in place and show up
    /// as orphans in the consistency report.
    pub async fn delete_compound(&self, id: &str) -> InventoryResult<()> {
        let previous = self.get_compound(id).await?;
        let mut undo = UndoLog::new();
        undo.compound(id, Some(previous));
        self.cache.remove_compound(id);
        self.persist(undo, async {
            let found = self.store.delete_compound(&id.to_string()).await?;
            require_found(found, "Compound", id)
        })
        .await?;

        log::info!("Deleted compound {}", id);
        self.cache
            .notify(InventoryEvent::CompoundDeleted { id: id.to_string() });
        Ok(())
    }

    // ---- instances -------------------------------------------------------

    pub async fn list_instances(&self, params: &ListParams) -> InventoryResult<Page<Value>> {
        self.ensure_loaded().await?;
        page_of(&self.cache.instances(), params)
    }

    pub async fn instances(&self) -> InventoryResult<Vec<CompoundInstance>> {
        self.ensure_loaded().await?;
        Ok(self.cache.instances())
    }

    pub async fn get_instance(&self, id: &str) -> InventoryResult<CompoundInstance> {
        self.ensure_loaded().await?;
        self.cache
            .instance(id)
            .ok_or_else(|| InventoryError::not_found("Instance", id))
    }

    /// Every instance of a compound, used up ones included
    pub async fn instances_of(&self, compound_id: &str) -> InventoryResult<Vec<CompoundInstance>> {
        self.get_compound(compound_id).await?;
        Ok(self
            .cache
            .instances()
            .into_iter()
            .filter(|i| i.compound_id == compound_id)
            .collect())
    }

    /// Validated instance ready for insertion; the unit defaults to the compound's
    fn prepare_instance(&self, mut request: NewInstance) -> InventoryResult<CompoundInstance> {
        let errors = request.validate();
        if !errors.is_empty() {
            return Err(InventoryError::Validation(errors));
        }
        let compound = self
            .cache
            .compound(&request.compound_id)
            .ok_or_else(|| InventoryError::not_found("Compound", &request.compound_id))?;
        if request.unit.trim().is_empty() {
            request.unit = compound.unit;
        }
        Ok(request.into_instance())
    }

    pub async fn create_instance(&self, request: NewInstance) -> InventoryResult<CompoundInstance> {
        self.ensure_loaded().await?;
        let instance = self.prepare_instance(request)?;

        let mut undo = UndoLog::new();
        undo.instance(&instance.id, None);
        self.cache.put_instance(instance.clone());
        self.persist(undo, async {
            self.store.insert_instance(&instance).await?;
            Ok(())
        })
        .await?;

        log::info!(
            "Created instance {} of compound {} at '{}'",
            instance.id,
            instance.compound_id,
            instance.location
        );
        self.cache
            .notify(InventoryEvent::InstanceChanged { id: instance.id.clone() });
        Ok(instance)
    }

    /// Direct edit of an instance record. Quantity changes made here bypass the
    /// transaction log; the status is still derived from the quantity.
    pub async fn update_instance(&self, id: &str, update: InstanceUpdate) -> InventoryResult<CompoundInstance> {
        let previous = self.get_instance(id).await?;
        if update.quantity.is_some_and(|q| q < 0.0) {
            return Err(InventoryError::validation("Quantity must be a non-negative number"));
        }
        let mut instance = previous.clone();
        update.apply_to(&mut instance);
        if instance.location.is_empty() {
            return Err(InventoryError::validation("Location is required"));
        }

        let mut undo = UndoLog::new();
        undo.instance(id, Some(previous));
        self.cache.put_instance(instance.clone());
        self.persist(undo, async {
            let found = self.store.replace_instance(&instance).await?;
            require_found(found, "Instance", id)
        })
        .await?;

        self.cache
            .notify(InventoryEvent::InstanceChanged { id: id.to_string() });
        Ok(instance)
    }

    pub async fn delete_instance(&self, id: &str) -> InventoryResult<()> {
        let previous = self.get_instance(id).await?;
        let mut undo = UndoLog::new();
        undo.instance(id, Some(previous));
        self.cache.remove_instance(id);
        self.persist(undo, async {
            let found = self.store.delete_instance(&id.to_string()).await?;
            require_found(found, "Instance", id)
        })
        .await?;

        log::info!("Deleted instance {}", id);
        self.cache
            .notify(InventoryEvent::InstanceDeleted { id: id.to_string() });
        Ok(())
    }

    // ---- transactions ----------------------------------------------------

    pub async fn list_transactions(&self, params: &ListParams) -> InventoryResult<Page<Value>> {
        self.ensure_loaded().await?;
        page_of(&self.cache.transactions(), params)
    }

    pub async fn get_transaction(&self, id: &str) -> InventoryResult<Transaction> {
        self.ensure_loaded().await?;
        self.cache
            .transaction(id)
            .ok_or_else(|| InventoryError::not_found("Transaction", id))
    }

    /// Log entries for one instance, newest first
    pub async fn transactions_for_instance(&self, instance_id: &str) -> InventoryResult<Vec<Transaction>> {
        self.get_instance(instance_id).await?;
        Ok(self.newest_first(|t| t.instance_id == instance_id))
    }

    /// Log entries for every instance of a compound, newest first
    pub async fn transactions_for_compound(&self, compound_id: &str) -> InventoryResult<Vec<Transaction>> {
        self.get_compound(compound_id).await?;
        Ok(self.newest_first(|t| t.compound_id == compound_id))
    }

    fn newest_first(&self, keep: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .cache
            .transactions()
            .into_iter()
            .filter(|t| keep(t))
            .collect();
        transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        transactions
    }

    /// Validate and apply an operation to an instance, then append it to the log.
    ///
    /// All rule violations are reported together before anything changes. If the
    /// log append fails after the instance was written, the instance write is
    /// compensated with the prior record.
    pub async fn apply_transaction(
        &self,
        request: TransactionRequest,
        user: &UserContext,
    ) -> InventoryResult<AppliedTransaction> {
        self.ensure_loaded().await?;
        let current = self.cache.instance(request.instance_id.trim());

        // Unknown instance: skip the availability check and report it as not found
        let available = current.as_ref().map_or(f64::INFINITY, |i| i.quantity);
        let plan = transaction_engine::validate_request(&request, available)
            .map_err(InventoryError::Validation)?;
        let instance = current.ok_or_else(|| InventoryError::not_found("Instance", &request.instance_id))?;

        let updated = transaction_engine::apply_to_instance(&instance, &plan);
        let transaction = transaction_engine::build_transaction(&instance, &plan, &request, user);

        let mut undo = UndoLog::new();
        undo.instance(&instance.id, Some(instance.clone()));
        undo.transaction(&transaction.id, None);
        self.cache.put_instance(updated.clone());
        self.cache.put_transaction(transaction.clone());

        self.persist(undo, async {
            let found = self.store.replace_instance(&updated).await?;
            require_found(found, "Instance", &instance.id)?;
            if let Err(error) = self.store.insert_transaction(&transaction).await {
                if let Err(compensation) = self.store.replace_instance(&instance).await {
                    log::error!(
                        "Could not restore instance {} after failed log append: {}",
                        instance.id,
                        compensation
                    );
                }
                return Err(error.into());
            }
            Ok(())
        })
        .await?;

        log::info!(
            "{} {} {} on instance {} by {} ({} -> {})",
            transaction.transaction_type,
            transaction.quantity,
            updated.unit,
            updated.id,
            user.user_name,
            plan.original_quantity,
            plan.new_quantity
        );
        self.cache
            .notify(InventoryEvent::InstanceChanged { id: updated.id.clone() });
        self.cache.notify(InventoryEvent::TransactionRecorded {
            id: transaction.id.clone(),
            instance_id: updated.id.clone(),
        });
        Ok(AppliedTransaction {
            transaction,
            instance: updated,
        })
    }

    /// Administrative correction of a log entry. The instance is not touched.
    pub async fn update_transaction(
        &self,
        id: &str,
        update: TransactionUpdate,
        user: &UserContext,
    ) -> InventoryResult<Transaction> {
        let previous = self.get_transaction(id).await?;
        let mut transaction = previous.clone();
        if let Some(quantity) = update.quantity {
            let valid = match transaction.transaction_type {
                TransactionType::Adjust => quantity >= 0.0,
                _ => quantity > 0.0,
            };
            if !valid || !quantity.is_finite() {
                return Err(InventoryError::validation("Quantity must be greater than zero"));
            }
            transaction.quantity = quantity;
        }
        if let Some(notes) = update.notes {
            transaction.notes = Some(notes).filter(|n| !n.trim().is_empty());
        }
        if let Some(location) = update.location {
            transaction.location = Some(location).filter(|l| !l.trim().is_empty());
        }
        transaction.updated_at = Some(now_rfc3339());

        let mut undo = UndoLog::new();
        undo.transaction(id, Some(previous));
        self.cache.put_transaction(transaction.clone());
        self.persist(undo, async {
            let found = self.store.replace_transaction(&transaction).await?;
            require_found(found, "Transaction", id)
        })
        .await?;

        log::warn!(
            "Transaction {} edited by {}; instance {} quantity was not recalculated",
            id,
            user.user_name,
            transaction.instance_id
        );
        self.cache
            .notify(InventoryEvent::TransactionChanged { id: id.to_string() });
        Ok(transaction)
    }

    pub async fn delete_transaction(&self, id: &str, user: &UserContext) -> InventoryResult<()> {
        let previous = self.get_transaction(id).await?;
        let instance_id = previous.instance_id.clone();
        let mut undo = UndoLog::new();
        undo.transaction(id, Some(previous));
        self.cache.remove_transaction(id);
        self.persist(undo, async {
            let found = self.store.delete_transaction(&id.to_string()).await?;
            require_found(found, "Transaction", id)
        })
        .await?;

        log::warn!(
            "Transaction {} deleted by {}; instance {} quantity was not recalculated",
            id,
            user.user_name,
            instance_id
        );
        self.cache
            .notify(InventoryEvent::TransactionDeleted { id: id.to_string() });
        Ok(())
    }

    // ---- count sessions --------------------------------------------------

    pub async fn list_sessions(&self, params: &ListParams) -> InventoryResult<Page<Value>> {
        self.ensure_loaded().await?;
        page_of(&self.cache.sessions(), params)
    }

    pub async fn get_session(&self, id: &str) -> InventoryResult<InventoryCountSession> {
        self.ensure_loaded().await?;
        self.cache
            .session(id)
            .ok_or_else(|| InventoryError::not_found("Count session", id))
    }

    pub async fn create_session(
        &self,
        request: NewCountSession,
        user: &UserContext,
    ) -> InventoryResult<InventoryCountSession> {
        self.ensure_loaded().await?;
        let session = count_session::create_session(request, &self.cache.instances(), user)?;

        let mut undo = UndoLog::new();
        undo.session(&session.id, None);
        self.cache.put_session(session.clone());
        self.persist(undo, async {
            self.store.insert_session(&session).await?;
            Ok(())
        })
        .await?;

        log::info!(
            "Count session '{}' started by {} over {} location(s), {} instances expected",
            session.name,
            user.user_name,
            session.locations.len(),
            session.total_items
        );
        self.cache
            .notify(InventoryEvent::SessionChanged { id: session.id.clone() });
        Ok(session)
    }

    /// Persist a changed session, rolling the cache back on failure
    async fn save_session(
        &self,
        previous: InventoryCountSession,
        session: &InventoryCountSession,
    ) -> InventoryResult<()> {
        let mut undo = UndoLog::new();
        undo.session(&session.id, Some(previous));
        self.cache.put_session(session.clone());
        self.persist(undo, async {
            let found = self.store.replace_session(session).await?;
            require_found(found, "Count session", &session.id)
        })
        .await?;
        self.cache
            .notify(InventoryEvent::SessionChanged { id: session.id.clone() });
        Ok(())
    }

    pub async fn update_session(
        &self,
        id: &str,
        update: CountSessionUpdate,
    ) -> InventoryResult<InventoryCountSession> {
        let previous = self.get_session(id).await?;
        let mut session = previous.clone();
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(InventoryError::validation("Session name is required"));
            }
            session.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            session.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(notes) = update.notes {
            session.notes = notes;
        }
        self.save_session(previous, &session).await?;
        Ok(session)
    }

    pub async fn delete_session(&self, id: &str) -> InventoryResult<()> {
        let previous = self.get_session(id).await?;
        let mut undo = UndoLog::new();
        undo.session(id, Some(previous));
        self.cache.remove_session(id);
        self.persist(undo, async {
            let found = self.store.delete_session(&id.to_string()).await?;
            require_found(found, "Count session", id)
        })
        .await?;

        log::info!("Deleted count session {}", id);
        self.cache
            .notify(InventoryEvent::SessionDeleted { id: id.to_string() });
        Ok(())
    }

    pub async fn record_count(
        &self,
        session_id: &str,
        entry: CountEntry,
        user: &UserContext,
    ) -> InventoryResult<CountRecord> {
        let previous = self.get_session(session_id).await?;
        let mut session = previous.clone();
        let record = count_session::record_count(&mut session, entry, &self.cache.instances(), user)?;
        self.save_session(previous, &session).await?;
        Ok(record)
    }

    pub async fn verify_count(
        &self,
        session_id: &str,
        instance_id: &str,
        resolution: DiscrepancyResolution,
    ) -> InventoryResult<CountRecord> {
        let previous = self.get_session(session_id).await?;
        let mut session = previous.clone();
        let record = count_session::verify_count(&mut session, instance_id, resolution)?;
        self.save_session(previous, &session).await?;
        Ok(record)
    }

    /// Create an instance found during a count at one of the session's locations
    /// and register it with the session. If the session cannot be saved the
    /// new instance is removed from the store again.
    pub async fn add_session_instance(
        &self,
        session_id: &str,
        request: NewInstance,
        user: &UserContext,
    ) -> InventoryResult<CompoundInstance> {
        let previous = self.get_session(session_id).await?;
        count_session::check_new_instance_location(&previous, &request.location)?;
        let instance = self.prepare_instance(request)?;
        let mut session = previous.clone();
        count_session::register_new_instance(&mut session, &instance.id)?;

        let mut undo = UndoLog::new();
        undo.instance(&instance.id, None);
        undo.session(session_id, Some(previous));
        self.cache.put_instance(instance.clone());
        self.cache.put_session(session.clone());
        self.persist(undo, async {
            self.store.insert_instance(&instance).await?;
            let saved = match self.store.replace_session(&session).await {
                Ok(found) => require_found(found, "Count session", session_id),
                Err(error) => Err(error.into()),
            };
            if saved.is_err() {
                if let Err(compensation) = self.store.delete_instance(&instance.id).await {
                    log::error!(
                        "Could not remove instance {} after failed session update: {}",
                        instance.id,
                        compensation
                    );
                }
            }
            saved
        })
        .await?;

        log::info!(
            "{} added instance {} to count session {} at '{}'",
            user.user_name,
            instance.id,
            session_id,
            instance.location
        );
        self.cache
            .notify(InventoryEvent::InstanceChanged { id: instance.id.clone() });
        self.cache
            .notify(InventoryEvent::SessionChanged { id: session_id.to_string() });
        Ok(instance)
    }

    pub async fn session_progress(&self, session_id: &str) -> InventoryResult<SessionProgress> {
        Ok(count_session::progress(&self.get_session(session_id).await?))
    }

    pub async fn completion_status(&self, session_id: &str) -> InventoryResult<CompletionStatus> {
        Ok(count_session::completion_status(&self.get_session(session_id).await?))
    }

    pub async fn complete_session(
        &self,
        session_id: &str,
        notes: Option<String>,
        user: &UserContext,
    ) -> InventoryResult<InventoryCountSession> {
        let previous = self.get_session(session_id).await?;
        let mut session = previous.clone();
        count_session::complete_session(&mut session, notes, user)?;
        self.save_session(previous, &session).await?;

        let report = count_session::discrepancy_report(&session);
        log::info!(
            "Count session '{}' completed by {}: {} discrepancies, {} not found",
            session.name,
            user.user_name,
            report.items.len(),
            report.not_found
        );
        Ok(session)
    }

    pub async fn discrepancy_report(&self, session_id: &str) -> InventoryResult<DiscrepancyReport> {
        Ok(count_session::discrepancy_report(&self.get_session(session_id).await?))
    }

    // ---- derived views ---------------------------------------------------

    /// Stock figures of a compound, optionally converted to `unit`, which must
    /// belong to the same unit family as the compound's own unit
    pub async fn stock_report(&self, compound_id: &str, unit: Option<&str>) -> InventoryResult<StockReport> {
        let compound = self.get_compound(compound_id).await?;
        let instances = self.cache.instances();
        let converted = match unit.map(str::trim).filter(|u| !u.is_empty()) {
            None => None,
            Some(unit) if units::are_compatible(&compound.unit, unit) => Some(ConvertedStock {
                unit: unit.to_string(),
                total_stock: stock::total_stock_in(&instances, compound_id, unit),
            }),
            Some(unit) => {
                return Err(InventoryError::validation(format!(
                    "Stock of {} is kept in '{}' and cannot be expressed in '{}'",
                    compound.name, compound.unit, unit
                )))
            }
        };
        Ok(StockReport {
            stock: stock::compound_stock(&compound, &instances),
            summary: stock::instance_summary(&instances, compound_id, today()),
            converted,
        })
    }

    pub async fn low_stock(&self) -> InventoryResult<Vec<CompoundStock>> {
        self.ensure_loaded().await?;
        Ok(stock::low_stock(&self.cache.compounds(), &self.cache.instances()))
    }

    /// Active instances expiring within `months`, soonest first
    pub async fn expiring(&self, months: u32) -> InventoryResult<Vec<CompoundInstance>> {
        self.ensure_loaded().await?;
        let instances = self.cache.instances();
        Ok(stock::expiring_instances(&instances, today(), months)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn locations(&self) -> InventoryResult<Vec<String>> {
        self.ensure_loaded().await?;
        Ok(stock::all_locations(&self.cache.instances()))
    }

    pub async fn statistics(&self) -> InventoryResult<TransactionStatistics> {
        self.ensure_loaded().await?;
        Ok(stock::statistics(&self.cache.transactions()))
    }

    pub async fn search(&self, query: &SearchQuery) -> InventoryResult<Vec<CompoundView>> {
        if let SearchQuery::Advanced { conditions } = query {
            let errors = search::validate_conditions(conditions);
            if !errors.is_empty() {
                return Err(InventoryError::Validation(errors));
            }
        }
        self.ensure_loaded().await?;
        Ok(search::search(&self.cache.compounds(), &self.cache.instances(), query))
    }

    pub async fn consistency_report(&self) -> InventoryResult<ConsistencyReport> {
        self.ensure_loaded().await?;
        Ok(consistency::validate_consistency(
            &self.cache.compounds(),
            &self.cache.instances(),
            &self.cache.transactions(),
        ))
    }

    // ---- users -----------------------------------------------------------
    // Accounts are read straight from the store and never cached.

    pub async fn list_users(&self) -> InventoryResult<Vec<PublicUser>> {
        let users = self.store.list_users().await?;
        Ok(users.iter().map(PublicUser::from).collect())
    }

    pub async fn find_user(&self, username: &str) -> InventoryResult<Option<User>> {
        Ok(self.store.find_user_by_username(username).await?)
    }

    pub async fn create_user(&self, request: NewUser) -> InventoryResult<PublicUser> {
        let username = request.username.trim().to_string();
        let mut errors = Vec::new();
        if username.is_empty() {
            errors.push("Username is required".to_string());
        }
        if request.name.trim().is_empty() {
            errors.push("Name is required".to_string());
        }
        if request.password.len() < 6 {
            errors.push("Password must be at least 6 characters".to_string());
        }
        if !username.is_empty() && self.find_user(&username).await?.is_some() {
            errors.push(format!("Username '{}' is already taken", username));
        }
        if !errors.is_empty() {
            return Err(InventoryError::Validation(errors));
        }

        let user = User {
            id: crate::model::generate_id(),
            username,
            name: request.name.trim().to_string(),
            email: request.email.filter(|e| !e.trim().is_empty()),
            role: request.role,
            password_hash: hash_password(&request.password),
        };
        self.store.insert_user(&user).await?;
        log::info!("Created {:?} user '{}'", user.role, user.username);
        Ok(PublicUser::from(&user))
    }
}
