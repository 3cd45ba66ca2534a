//! Key-value store shared by every open dashboard context.
//!
//! Writes are broadcast to all subscribers; each [`StoreHandle`] filters out
//! the changes it made itself, so a context only ever hears about writes from
//! somewhere else.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use syncdash_logging::sync_trace;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

pub type ContextId = u64;

const CHANGE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub origin: ContextId,
}

pub trait SharedStore: Send + Sync {
    /// Allocates an id that tags the writes of one context.
    fn open_context(&self) -> ContextId;

    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, origin: ContextId, key: &str, value: &str);

    fn remove(&self, origin: ContextId, key: &str);

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-process [`SharedStore`]. Writes that leave the value unchanged are not
/// broadcast.
pub struct MemorySharedStore {
    values: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
    next_context: AtomicU64,
}

impl MemorySharedStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            changes,
            next_context: AtomicU64::new(1),
        }
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, change: StoreChange) {
        sync_trace!(
            "Store change key={} origin={} new={:?}",
            change.key,
            change.origin,
            change.new_value
        );
        // No receivers is fine: nobody else is listening yet.
        let _ = self.changes.send(change);
    }
}

impl Default for MemorySharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemorySharedStore {
    fn open_context(&self) -> ContextId {
        self.next_context.fetch_add(1, Ordering::Relaxed)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, origin: ContextId, key: &str, value: &str) {
        let old_value = {
            let mut values = self.values();
            if values.get(key).map(String::as_str) == Some(value) {
                return;
            }
            values.insert(key.to_string(), value.to_string())
        };
        self.publish(StoreChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value.to_string()),
            origin,
        });
    }

    fn remove(&self, origin: ContextId, key: &str) {
        let Some(old_value) = self.values().remove(key) else {
            return;
        };
        self.publish(StoreChange {
            key: key.to_string(),
            old_value: Some(old_value),
            new_value: None,
            origin,
        });
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// One context's view of a [`SharedStore`].
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn SharedStore>,
    context: ContextId,
}

impl StoreHandle {
    pub fn open(store: Arc<dyn SharedStore>) -> Self {
        let context = store.open_context();
        Self { store, context }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    pub fn set(&self, key: &str, value: &str) {
        self.store.set(self.context, key, value);
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(self.context, key);
    }

    /// Changes written by other contexts, from this point on.
    pub fn foreign_changes(&self) -> ForeignChanges {
        ForeignChanges {
            rx: self.store.subscribe(),
            context: self.context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignChange {
    Write(StoreChange),
    /// The listener fell behind and this many changes were dropped.
    Missed(u64),
}

pub struct ForeignChanges {
    rx: broadcast::Receiver<StoreChange>,
    context: ContextId,
}

impl ForeignChanges {
    /// Next change from another context; `None` once the store is gone.
    pub async fn next(&mut self) -> Option<ForeignChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.origin == self.context => continue,
                Ok(change) => return Some(ForeignChange::Write(change)),
                Err(RecvError::Lagged(skipped)) => return Some(ForeignChange::Missed(skipped)),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<MemorySharedStore> {
        Arc::new(MemorySharedStore::new())
    }

    #[tokio::test]
    async fn own_writes_are_filtered_out() {
        let store = store();
        let first = StoreHandle::open(store.clone());
        let second = StoreHandle::open(store.clone());
        let mut first_changes = first.foreign_changes();

        first.set("active_instance_id", "1");
        second.set("active_instance_id", "2");

        let change = first_changes.next().await.expect("change");
        assert_eq!(
            change,
            ForeignChange::Write(StoreChange {
                key: "active_instance_id".to_string(),
                old_value: Some("1".to_string()),
                new_value: Some("2".to_string()),
                origin: second.context(),
            })
        );
    }

    #[tokio::test]
    async fn unchanged_writes_are_not_broadcast() {
        let store = store();
        let writer = StoreHandle::open(store.clone());
        let reader = StoreHandle::open(store.clone());
        let mut changes = reader.foreign_changes();

        writer.set("k", "v");
        writer.set("k", "v");
        writer.remove("missing");
        writer.remove("k");

        let first = changes.next().await.expect("set");
        let second = changes.next().await.expect("remove");
        assert!(matches!(first, ForeignChange::Write(StoreChange { new_value: Some(_), .. })));
        assert!(matches!(second, ForeignChange::Write(StoreChange { new_value: None, .. })));
        assert!(changes.rx.try_recv().is_err());
        assert_eq!(reader.get("k"), None);
    }

    #[test]
    fn contexts_get_distinct_ids() {
        let store = store();
        let a = StoreHandle::open(store.clone());
        let b = StoreHandle::open(store);
        assert_ne!(a.context(), b.context());
    }

    #[tokio::test]
    async fn lagging_listener_reports_missed_changes() {
        let store = store();
        let writer = StoreHandle::open(store.clone());
        let reader = StoreHandle::open(store.clone());
        let mut changes = reader.foreign_changes();

        for i in 0..(CHANGE_CAPACITY + 3) {
            writer.set("k", &i.to_string());
        }

        assert_eq!(changes.next().await, Some(ForeignChange::Missed(3)));
    }
}
