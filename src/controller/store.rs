//! Local cache of observed events
//!
//! Holds the last-known snapshot of every live event, keyed by
//! `namespace/name`. Written only by the watch dispatcher; read
//! concurrently by the workers. Entries have no TTL, they live until the
//! corresponding delete notification removes them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use k8s_openapi::api::core::v1::Event;

/// Key-indexed snapshot store for watched events.
#[derive(Default)]
pub struct EventStore {
    events: RwLock<HashMap<String, Arc<Event>>>,
}

impl EventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (or insert) the snapshot for a key.
    pub fn upsert(&self, key: &str, event: Event) {
        let mut events = self.events.write().unwrap();
        events.insert(key.to_string(), Arc::new(event));
    }

    /// Drop the snapshot for a key.
    pub fn remove(&self, key: &str) {
        let mut events = self.events.write().unwrap();
        events.remove(key);
    }

    /// Look up the snapshot for a key. `None` means the object no longer
    /// exists (or was never observed).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Event>> {
        let events = self.events.read().unwrap();
        events.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
