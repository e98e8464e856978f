// Channel registry - at most one live task per channel key
//
// Each key owns a slot guarded by its own mutex, so register/cancel/unregister
// on one key never wait on another key. The outer map lock is only held long
// enough to look up or create a slot.

use super::types::{
    ChannelKey, ConnectionId, RegistryError, RegistryResult, TaskHandle, TaskSummary,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type Slot = Arc<Mutex<Option<TaskHandle>>>;

pub struct ChannelRegistry {
    slots: RwLock<HashMap<ChannelKey, Slot>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &ChannelKey) -> Slot {
        if let Some(slot) = self.slots.read().get(key) {
            return slot.clone();
        }
        self.slots.write().entry(key.clone()).or_default().clone()
    }

    fn existing_slot(&self, key: &ChannelKey) -> Option<Slot> {
        self.slots.read().get(key).cloned()
    }

    /// Insert `handle` only if its key has no live task.
    pub fn try_register(&self, handle: TaskHandle) -> RegistryResult<TaskHandle> {
        let slot = self.slot(&handle.key);
        let mut current = slot.lock();

        if let Some(existing) = current.as_ref() {
            return Err(RegistryError::Conflict {
                key: handle.key.clone(),
                existing: existing.id,
            });
        }

        *current = Some(handle.clone());
        debug!("Task {} registered on {}", handle.id, handle.key);
        Ok(handle)
    }

    /// Take the live task for `key` out of the registry and signal its token.
    /// The returned handle lets the caller wait for the task to exit.
    pub fn cancel_and_clear(&self, key: &ChannelKey) -> Option<TaskHandle> {
        let slot = self.existing_slot(key)?;
        let prior = slot.lock().take()?;
        prior.cancel();
        info!("🛑 Cancellation requested for task {} on {}", prior.id, key);
        Some(prior)
    }

    /// Remove the entry for `handle.key` only if it is still `handle`.
    /// A task that was already replaced leaves its successor untouched.
    pub fn unregister(&self, handle: &TaskHandle) -> bool {
        let Some(slot) = self.existing_slot(&handle.key) else {
            return false;
        };
        let mut current = slot.lock();

        match current.as_ref() {
            Some(live) if live.id == handle.id => {
                *current = None;
                debug!("Task {} unregistered from {}", handle.id, handle.key);
                true
            }
            _ => false,
        }
    }

    /// Signal every registered token. Entries stay until their tasks exit.
    pub fn cancel_all(&self) -> usize {
        let slots = self.slots.read();
        let mut cancelled = 0;
        for slot in slots.values() {
            if let Some(handle) = slot.lock().as_ref() {
                handle.cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!("🛑 Cancelled all {} active tasks", cancelled);
        }
        cancelled
    }

    /// Cancel and clear every lane owned by `connection`.
    pub fn cancel_connection(&self, connection: ConnectionId) -> Vec<TaskHandle> {
        let slots: Vec<Slot> = self
            .slots
            .read()
            .iter()
            .filter(|(key, _)| key.connection == connection)
            .map(|(_, slot)| slot.clone())
            .collect();

        let mut cancelled = Vec::new();
        for slot in slots {
            if let Some(handle) = slot.lock().take() {
                handle.cancel();
                cancelled.push(handle);
            }
        }
        cancelled
    }

    /// Drop empty slots of `connection`.
    ///
    /// A slot is only removed while the map is write-locked and nobody else
    /// holds a reference to it, so no caller can be mid-operation on it.
    pub fn prune_connection(&self, connection: ConnectionId) -> usize {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|key, slot| {
            key.connection != connection || Arc::strong_count(slot) > 1 || slot.lock().is_some()
        });
        before - slots.len()
    }

    pub fn is_active(&self, key: &ChannelKey) -> bool {
        match self.existing_slot(key) {
            Some(slot) => {
                let active = slot.lock().is_some();
                active
            }
            None => false,
        }
    }

    pub fn get(&self, key: &ChannelKey) -> Option<TaskHandle> {
        let slot = self.existing_slot(key)?;
        let handle = slot.lock().clone();
        handle
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TaskSummary> {
        self.slots
            .read()
            .values()
            .filter_map(|slot| slot.lock().as_ref().map(TaskHandle::summary))
            .collect()
    }

    /// Number of key slots, including empty ones
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
