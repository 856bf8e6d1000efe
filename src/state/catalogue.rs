//! Id-keyed entity maps, with upsert-then-project semantics (§4.5).
//!
//! A second payload for a known id updates that entity in place; the map
//! never duplicates entries (§3 invariants, §8 "catalogue idempotence").

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::RwLock;

pub struct Catalogue<Id, T> {
    entries: RwLock<HashMap<Id, Arc<T>>>,
}

impl<Id: Eq + Hash + Clone, T> Catalogue<Id, T> {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub async fn get(&self, id: &Id) -> Option<Arc<T>> {
        self.entries.read().await.get(id).cloned()
    }

    /// Return the existing entity for `id`, or insert `make()`'s result and
    /// return that.
    pub async fn get_or_insert_with(&self, id: Id, make: impl FnOnce() -> T) -> Arc<T> {
        if let Some(existing) = self.entries.read().await.get(&id).cloned() {
            return existing;
        }
        let mut entries = self.entries.write().await;
        entries.entry(id).or_insert_with(|| Arc::new(make())).clone()
    }

    /// A read-only point-in-time copy of the map, safe to hand to callers
    /// that must not observe further mutation (§5).
    pub async fn snapshot(&self) -> HashMap<Id, Arc<T>> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<Id: Eq + Hash + Clone, T> Default for Catalogue<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}
