//! Monitoring events emitted by `Database` and its subscription streams.
//!
//! One `Arc<EventBus>` is shared by a `Database` and every stream it hands
//! out. Listeners can watch everything or a single collection.

use crate::record::Timestamp;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Where an emitted snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotSource {
    /// Initial emission read from the local cache.
    Cache,
    /// Emission triggered by a remote change notification.
    Remote,
}

/// Events emitted by the sync layer for real-time monitoring.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A subscription emitted a snapshot.
    SnapshotEmitted {
        /// Collection or document path.
        path: String,
        /// Number of live records in the snapshot.
        count: usize,
        source: SnapshotSource,
        /// Milliseconds since Unix epoch.
        timestamp: Timestamp,
    },
    /// A document was written through the sync layer.
    DocumentWritten { path: String, timestamp: Timestamp },
    /// A document was soft-deleted.
    DocumentDeleted { path: String, timestamp: Timestamp },
    /// A one-shot query ran.
    QueryExecuted {
        path: String,
        field: String,
        count: usize,
        timestamp: Timestamp,
    },
}

impl SyncEvent {
    /// Collection or document path the event is about.
    pub fn path(&self) -> &str {
        match self {
            SyncEvent::SnapshotEmitted { path, .. }
            | SyncEvent::DocumentWritten { path, .. }
            | SyncEvent::DocumentDeleted { path, .. }
            | SyncEvent::QueryExecuted { path, .. } => path,
        }
    }
}

/// Handle returned by `EventBus::subscribe`. Dropping it removes the listener.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(SyncEvent) + Send + Sync>;

struct Listener {
    id: usize,
    /// Only events on this collection or its documents; `None` for all.
    scope: Option<String>,
    callback: Callback,
}

impl Listener {
    fn wants(&self, event: &SyncEvent) -> bool {
        let Some(scope) = &self.scope else {
            return true;
        };
        let path = event.path();
        path == scope.as_str()
            || path
                .strip_prefix(scope.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Fan-out of `SyncEvent`s to monitoring callbacks, optionally scoped to
/// one collection.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.add(None, Arc::new(callback))
    }

    /// Receive events for `path` and, when it names a collection, for its
    /// documents.
    pub fn subscribe_path(
        self: &Arc<Self>,
        path: &str,
        callback: impl Fn(SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let scope = path.trim_matches('/').to_string();
        self.add(Some(scope), Arc::new(callback))
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn emit(&self, event: SyncEvent) {
        // Callbacks run outside the lock so they may subscribe or drop handles.
        let targets: Vec<Callback> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|listener| listener.wants(&event))
            .map(|listener| Arc::clone(&listener.callback))
            .collect();

        for callback in targets {
            callback(event.clone());
        }
    }

    fn add(self: &Arc<Self>, scope: Option<String>, callback: Callback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Listener {
                id,
                scope,
                callback,
            });
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn remove(&self, id: usize) {
        // try_write: a handle may drop while `emit` holds the read lock
        if let Ok(mut listeners) = self.listeners.try_write() {
            listeners.retain(|listener| listener.id != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(path: &str) -> SyncEvent {
        SyncEvent::DocumentWritten {
            path: path.into(),
            timestamp: 1000,
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(written("howtos/a"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        bus.emit(written("howtos/a"));
        drop(sub);
        bus.emit(written("howtos/b"));

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_scoped_subscription_sees_only_its_collection() {
        let bus = Arc::new(EventBus::new());
        let paths = Arc::new(RwLock::new(Vec::new()));
        let paths_clone = Arc::clone(&paths);

        let _sub = bus.subscribe_path("/howtos/", move |event| {
            paths_clone.write().unwrap().push(event.path().to_string());
        });
        bus.emit(written("howtos/a"));
        bus.emit(written("howtos_archive/b"));
        bus.emit(written("mappins/c"));
        bus.emit(SyncEvent::QueryExecuted {
            path: "howtos".into(),
            field: "moderation".into(),
            count: 0,
            timestamp: 1000,
        });

        assert_eq!(*paths.read().unwrap(), vec!["howtos/a", "howtos"]);
    }

    #[test]
    fn test_dropped_subscriptions_are_removed() {
        let bus = Arc::new(EventBus::new());
        let all = bus.subscribe(|_| {});
        let scoped = bus.subscribe_path("howtos", |_| {});
        assert_eq!(bus.listener_count(), 2);

        drop(all);
        drop(scoped);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = SyncEvent::SnapshotEmitted {
            path: "howtos".into(),
            count: 3,
            source: SnapshotSource::Cache,
            timestamp: 1234,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"snapshotEmitted\""));
        assert!(json.contains("\"source\":\"cache\""));
        assert!(json.contains("\"count\":3"));
    }
}
