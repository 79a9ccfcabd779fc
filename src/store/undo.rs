use crate::model::{Compound, CompoundInstance, Id, InventoryCountSession, Transaction};
use crate::store::cache::{InventoryCache, InventoryEvent};

/// Prior state of one cached record; `None` means the record did not exist
#[derive(Debug, Clone)]
enum UndoEntry {
    Compound(Id, Option<Compound>),
    Instance(Id, Option<CompoundInstance>),
    Transaction(Id, Option<Transaction>),
    Session(Id, Option<InventoryCountSession>),
}

/// Records cache state before an optimistic change so it can be put back
/// when the store write fails.
#[derive(Debug, Default)]
#[must_use = "an undo log must be committed or restored"]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn compound(&mut self, id: &str, previous: Option<Compound>) {
        self.entries.push(UndoEntry::Compound(id.to_string(), previous));
    }

    pub fn instance(&mut self, id: &str, previous: Option<CompoundInstance>) {
        self.entries.push(UndoEntry::Instance(id.to_string(), previous));
    }

    pub fn transaction(&mut self, id: &str, previous: Option<Transaction>) {
        self.entries.push(UndoEntry::Transaction(id.to_string(), previous));
    }

    pub fn session(&mut self, id: &str, previous: Option<InventoryCountSession>) {
        self.entries.push(UndoEntry::Session(id.to_string(), previous));
    }

    /// The change reached the store; the snapshots are no longer needed
    pub fn commit(self) {}

    /// Put every recorded record back, newest change first
    pub fn restore(self, cache: &InventoryCache) {
        let count = self.entries.len();
        for entry in self.entries.into_iter().rev() {
            match entry {
                UndoEntry::Compound(_, Some(previous)) => cache.put_compound(previous),
                UndoEntry::Compound(id, None) => {
                    cache.remove_compound(&id);
                }
                UndoEntry::Instance(_, Some(previous)) => cache.put_instance(previous),
                UndoEntry::Instance(id, None) => {
                    cache.remove_instance(&id);
                }
                UndoEntry::Transaction(_, Some(previous)) => cache.put_transaction(previous),
                UndoEntry::Transaction(id, None) => {
                    cache.remove_transaction(&id);
                }
                UndoEntry::Session(_, Some(previous)) => cache.put_session(previous),
                UndoEntry::Session(id, None) => {
                    cache.remove_session(&id);
                }
            }
        }
        log::warn!("Rolled back {} optimistic cache change(s)", count);
        cache.notify(InventoryEvent::RolledBack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewInstance;
    use std::time::Duration;

    fn instance(quantity: f64) -> CompoundInstance {
        NewInstance {
            compound_id: "c1".to_string(),
            batch_number: String::new(),
            quantity,
            unit: "g".to_string(),
            location: "Shelf".to_string(),
            received_date: None,
            expiry_date: None,
            opened_date: None,
            description: None,
        }
        .into_instance()
    }

    #[test]
    fn test_restore_reverts_update_and_insert() {
        let cache = InventoryCache::new(Duration::from_secs(60));
        let original = instance(10.0);
        cache.put_instance(original.clone());

        let mut undo = UndoLog::new();
        undo.instance(&original.id, Some(original.clone()));
        let mut changed = original.clone();
        changed.set_quantity(2.0);
        cache.put_instance(changed);

        let added = instance(5.0);
        undo.instance(&added.id, None);
        cache.put_instance(added.clone());
        assert_eq!(undo.len(), 2);

        undo.restore(&cache);
        assert_eq!(cache.instance(&original.id).unwrap().quantity, 10.0);
        assert!(cache.instance(&added.id).is_none());
    }

    #[test]
    fn test_commit_keeps_changes() {
        let cache = InventoryCache::new(Duration::from_secs(60));
        let added = instance(5.0);
        let mut undo = UndoLog::new();
        undo.instance(&added.id, None);
        cache.put_instance(added.clone());
        undo.commit();
        assert!(cache.instance(&added.id).is_some());
    }
}
