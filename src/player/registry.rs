//! Append-only instance registry
//!
//! Indices are identities: once an instance is added at index N it stays at
//! index N for the lifetime of the service. Instances are never removed
//! individually; the whole sequence is released and cleared in one step at
//! teardown. Lookups from any thread are cheap reads under an RwLock.

use crate::player::PlayerInstance;
use log::info;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
pub struct PlayerRegistry {
    instances: RwLock<Vec<Arc<PlayerInstance>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instance and return its index
    pub fn add(&self, instance: Arc<PlayerInstance>) -> usize {
        let mut instances = self.instances.write();
        let index = instances.len();
        instances.push(instance);
        info!("registered player instance {}", index);
        index
    }

    /// Look an instance up by index
    pub fn get(&self, index: usize) -> Option<Arc<PlayerInstance>> {
        self.instances.read().get(index).cloned()
    }

    /// Number of instances ever created
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Snapshot of all instances, for iteration without holding the lock
    pub fn snapshot(&self) -> Vec<Arc<PlayerInstance>> {
        self.instances.read().clone()
    }

    /// Release every instance and clear the backing sequence. Teardown
    /// only: afterwards the registry is empty and every index is out of
    /// range. Callers still holding an instance see it released.
    pub fn release_all(&self) {
        for instance in self.snapshot() {
            instance.release();
        }
        self.instances.write().clear();
    }
}
