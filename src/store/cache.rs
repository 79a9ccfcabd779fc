use parking_lot::RwLock;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::model::{Compound, CompoundInstance, Id, InventoryCountSession, Transaction};

/// Change notifications published by the inventory cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InventoryEvent {
    Reloaded,
    CompoundChanged { id: Id },
    CompoundDeleted { id: Id },
    InstanceChanged { id: Id },
    InstanceDeleted { id: Id },
    TransactionRecorded { id: Id, instance_id: Id },
    TransactionChanged { id: Id },
    TransactionDeleted { id: Id },
    SessionChanged { id: Id },
    SessionDeleted { id: Id },
    /// An optimistic change was rolled back after a failed write
    RolledBack,
}

#[derive(Debug, Default)]
struct Collections {
    compounds: Vec<Compound>,
    instances: Vec<CompoundInstance>,
    transactions: Vec<Transaction>,
    sessions: Vec<InventoryCountSession>,
}

/// Snapshot of every cached collection
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub compounds: Vec<Compound>,
    pub instances: Vec<CompoundInstance>,
    pub transactions: Vec<Transaction>,
    pub sessions: Vec<InventoryCountSession>,
}

/// Shared in-memory copy of the inventory collections with a time-to-live.
/// Locks are held only inside these synchronous methods.
#[derive(Debug)]
pub struct InventoryCache {
    collections: RwLock<Collections>,
    loaded_at: RwLock<Option<Instant>>,
    ttl: Duration,
    events: broadcast::Sender<InventoryEvent>,
}

fn upsert<T: Clone>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

impl InventoryCache {
    pub fn new(ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            collections: RwLock::new(Collections::default()),
            loaded_at: RwLock::new(None),
            ttl,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
        self.events.subscribe()
    }

    pub fn notify(&self, event: InventoryEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Loaded and younger than the TTL
    pub fn is_fresh(&self) -> bool {
        self.loaded_at
            .read()
            .is_some_and(|loaded| loaded.elapsed() <= self.ttl)
    }

    pub fn invalidate(&self) {
        *self.loaded_at.write() = None;
    }

    /// Replace every collection with an authoritative copy from the store
    pub fn replace_all(&self, snapshot: CacheSnapshot) {
        {
            let mut collections = self.collections.write();
            collections.compounds = snapshot.compounds;
            collections.instances = snapshot.instances;
            collections.transactions = snapshot.transactions;
            collections.sessions = snapshot.sessions;
        }
        *self.loaded_at.write() = Some(Instant::now());
        self.notify(InventoryEvent::Reloaded);
    }

    pub fn compounds(&self) -> Vec<Compound> {
        self.collections.read().compounds.clone()
    }

    pub fn compound(&self, id: &str) -> Option<Compound> {
        self.collections
            .read()
            .compounds
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn put_compound(&self, compound: Compound) {
        let id = compound.id.clone();
        upsert(&mut self.collections.write().compounds, compound, |c| c.id == id);
    }

    pub fn remove_compound(&self, id: &str) -> Option<Compound> {
        let mut collections = self.collections.write();
        let index = collections.compounds.iter().position(|c| c.id == id)?;
        Some(collections.compounds.remove(index))
    }

    pub fn instances(&self) -> Vec<CompoundInstance> {
        self.collections.read().instances.clone()
    }

    pub fn instance(&self, id: &str) -> Option<CompoundInstance> {
        self.collections
            .read()
            .instances
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    pub fn put_instance(&self, instance: CompoundInstance) {
        let id = instance.id.clone();
        upsert(&mut self.collections.write().instances, instance, |i| i.id == id);
    }

    pub fn remove_instance(&self, id: &str) -> Option<CompoundInstance> {
        let mut collections = self.collections.write();
        let index = collections.instances.iter().position(|i| i.id == id)?;
        Some(collections.instances.remove(index))
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.collections.read().transactions.clone()
    }

    pub fn transaction(&self, id: &str) -> Option<Transaction> {
        self.collections
            .read()
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn put_transaction(&self, transaction: Transaction) {
        let id = transaction.id.clone();
        upsert(&mut self.collections.write().transactions, transaction, |t| t.id == id);
    }

    pub fn remove_transaction(&self, id: &str) -> Option<Transaction> {
        let mut collections = self.collections.write();
        let index = collections.transactions.iter().position(|t| t.id == id)?;
        Some(collections.transactions.remove(index))
    }

    pub fn sessions(&self) -> Vec<InventoryCountSession> {
        self.collections.read().sessions.clone()
    }

    pub fn session(&self, id: &str) -> Option<InventoryCountSession> {
        self.collections
            .read()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn put_session(&self, session: InventoryCountSession) {
        let id = session.id.clone();
        upsert(&mut self.collections.write().sessions, session, |s| s.id == id);
    }

    pub fn remove_session(&self, id: &str) -> Option<InventoryCountSession> {
        let mut collections = self.collections.write();
        let index = collections.sessions.iter().position(|s| s.id == id)?;
        Some(collections.sessions.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewCompound;

    fn compound(name: &str) -> Compound {
        NewCompound {
            name: name.to_string(),
            cas_number: None,
            hazard_class: String::new(),
            supplier: None,
            synonyms: None,
            unit: "g".to_string(),
            threshold: 0.0,
            description: None,
        }
        .into_compound()
    }

    #[test]
    fn test_freshness_and_invalidation() {
        let cache = InventoryCache::new(Duration::from_secs(60));
        assert!(!cache.is_fresh());
        cache.replace_all(CacheSnapshot::default());
        assert!(cache.is_fresh());
        cache.invalidate();
        assert!(!cache.is_fresh());

        let expired = InventoryCache::new(Duration::ZERO);
        expired.replace_all(CacheSnapshot::default());
        std::thread::sleep(Duration::from_millis(5));
        assert!(!expired.is_fresh());
    }

    #[tokio::test]
    async fn test_put_replaces_and_notifies() {
        let cache = InventoryCache::new(Duration::from_secs(60));
        let mut events = cache.subscribe();
        let mut c = compound("Ethanol");
        cache.put_compound(c.clone());
        c.name = "Ethyl alcohol".to_string();
        cache.put_compound(c.clone());
        assert_eq!(cache.compounds().len(), 1);
        assert_eq!(cache.compound(&c.id).unwrap().name, "Ethyl alcohol");

        cache.notify(InventoryEvent::CompoundChanged { id: c.id.clone() });
        assert_eq!(
            events.recv().await.unwrap(),
            InventoryEvent::CompoundChanged { id: c.id.clone() }
        );
        assert!(cache.remove_compound(&c.id).is_some());
        assert!(cache.remove_compound(&c.id).is_none());
    }
}
