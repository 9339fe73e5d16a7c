//! In-memory document store for testing and local replay.
//!
//! Models a client of a remote document database: a remote table holds the
//! authoritative documents, a cache table holds what this client has seen.
//! Local writes land in both; `insert_remote` simulates another client's
//! write that only reaches this client through listeners.

use crate::path::{DocPath, collection_path, doc_path};
use crate::query::Filter;
use crate::record::{Fields, Record, Timestamp};
use crate::store::{ChangeStream, DocumentStore, Result, StoreError, WriteMode};
use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// collection path -> document id -> record
type Table = HashMap<String, HashMap<String, Record>>;

struct CollectionListener {
    path: String,
    start_after: Option<Timestamp>,
    tx: UnboundedSender<Result<Vec<Record>>>,
}

struct DocumentListener {
    path: DocPath,
    tx: UnboundedSender<Result<Option<Record>>>,
}

/// In-memory store with remote/cache separation and live listeners.
#[derive(Default)]
pub struct InMemoryStore {
    remote: RwLock<Table>,
    cache: RwLock<Table>,
    collection_listeners: Mutex<Vec<CollectionListener>>,
    document_listeners: Mutex<Vec<DocumentListener>>,
    /// Collections whose writes fail with `StoreError::Unavailable`
    failing: RwLock<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a document as another client would: remote only.
    ///
    /// Listeners are notified, which is the only way the record reaches the
    /// local cache.
    pub fn insert_remote(&self, path: &str, fields: Fields) -> Result<()> {
        let doc = DocPath::parse(path)?;
        let record = Record::new(doc.id(), fields);
        write(&self.remote)
            .entry(doc.collection().to_string())
            .or_default()
            .insert(doc.id().to_string(), record);
        self.notify(&doc);
        Ok(())
    }

    /// Drop every cached record, as a freshly installed client would have.
    pub fn clear_cache(&self) {
        write(&self.cache).clear();
    }

    /// Make writes to `collection` fail until `restore_writes` is called.
    pub fn fail_writes_to(&self, collection: &str) {
        write(&self.failing).insert(collection.trim_matches('/').to_string());
    }

    pub fn restore_writes(&self, collection: &str) {
        write(&self.failing).remove(collection.trim_matches('/'));
    }

    /// Remote records of a collection, oldest first, tombstones included.
    pub fn collection(&self, path: &str) -> Vec<Record> {
        let path = path.trim_matches('/');
        snapshot(&read(&self.remote), path, None)
    }

    /// Number of live listeners. Closed listeners are pruned first.
    pub fn listener_count(&self) -> usize {
        let mut collections = lock(&self.collection_listeners);
        collections.retain(|l| !l.tx.is_closed());
        let mut documents = lock(&self.document_listeners);
        documents.retain(|l| !l.tx.is_closed());
        collections.len() + documents.len()
    }

    fn check_writable(&self, collection: &str) -> Result<()> {
        if read(&self.failing).contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "writes to `{collection}` are failing"
            )));
        }
        Ok(())
    }

    fn fill_cache(&self, collection: &str, records: &[Record]) {
        let mut cache = write(&self.cache);
        let docs = cache.entry(collection.to_string()).or_default();
        for record in records {
            docs.insert(record.id().to_string(), record.clone());
        }
    }

    fn remote_document(&self, path: &DocPath) -> Option<Record> {
        read(&self.remote)
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
            .cloned()
    }

    /// Push fresh snapshots to listeners affected by a change to `doc`.
    fn notify(&self, doc: &DocPath) {
        let mut collections = lock(&self.collection_listeners);
        collections.retain(|listener| {
            if listener.path != doc.collection() {
                return !listener.tx.is_closed();
            }
            let records = snapshot(&read(&self.remote), &listener.path, listener.start_after);
            self.fill_cache(&listener.path, &records);
            listener.tx.unbounded_send(Ok(records)).is_ok()
        });
        drop(collections);

        let mut documents = lock(&self.document_listeners);
        documents.retain(|listener| {
            if listener.path != *doc {
                return !listener.tx.is_closed();
            }
            let record = self.remote_document(&listener.path);
            if let Some(record) = &record {
                self.fill_cache(listener.path.collection(), std::slice::from_ref(record));
            }
            listener.tx.unbounded_send(Ok(record)).is_ok()
        });
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn cached_collection(&self, path: &str) -> Result<Vec<Record>> {
        let path = collection_path(path)?;
        Ok(snapshot(&read(&self.cache), &path, None))
    }

    async fn cached_document(&self, path: &str) -> Result<Option<Record>> {
        let doc = DocPath::parse(path)?;
        Ok(read(&self.cache)
            .get(doc.collection())
            .and_then(|docs| docs.get(doc.id()))
            .cloned())
    }

    async fn listen_collection(
        &self,
        path: &str,
        start_after: Option<Timestamp>,
    ) -> Result<ChangeStream<Vec<Record>>> {
        let path = collection_path(path)?;
        let (tx, rx) = unbounded();

        // Registration and the initial snapshot happen under the listener
        // lock so no change can slip between them.
        let mut listeners = lock(&self.collection_listeners);
        let records = snapshot(&read(&self.remote), &path, start_after);
        self.fill_cache(&path, &records);
        debug!(
            "listen {} (start_after={:?}): initial snapshot of {} record(s)",
            path,
            start_after,
            records.len()
        );
        // The receiver is alive, so this cannot fail.
        let _ = tx.unbounded_send(Ok(records));
        listeners.push(CollectionListener {
            path,
            start_after,
            tx,
        });

        Ok(rx.boxed())
    }

    async fn listen_document(&self, path: &str) -> Result<ChangeStream<Option<Record>>> {
        let doc = DocPath::parse(path)?;
        let (tx, rx) = unbounded();

        let mut listeners = lock(&self.document_listeners);
        let record = self.remote_document(&doc);
        if let Some(record) = &record {
            self.fill_cache(doc.collection(), std::slice::from_ref(record));
        }
        let _ = tx.unbounded_send(Ok(record));
        listeners.push(DocumentListener { path: doc, tx });

        Ok(rx.boxed())
    }

    async fn get_document(&self, path: &str) -> Result<Option<Record>> {
        let doc = DocPath::parse(path)?;
        let record = self.remote_document(&doc);
        if let Some(record) = &record {
            self.fill_cache(doc.collection(), std::slice::from_ref(record));
        }
        Ok(record)
    }

    async fn set_document(&self, path: &str, fields: Fields, mode: WriteMode) -> Result<()> {
        let doc = DocPath::parse(path)?;
        self.check_writable(doc.collection())?;

        let record = {
            let mut remote = write(&self.remote);
            let docs = remote.entry(doc.collection().to_string()).or_default();
            let merged = match (mode, docs.get(doc.id())) {
                (WriteMode::Merge, Some(existing)) if !existing.is_deleted() => {
                    let mut merged = existing.fields().clone();
                    merged.extend(fields);
                    merged
                }
                _ => fields,
            };
            let record = Record::new(doc.id(), merged);
            docs.insert(doc.id().to_string(), record.clone());
            record
        };

        // Local writes are visible in the cache immediately.
        self.fill_cache(doc.collection(), std::slice::from_ref(&record));
        self.notify(&doc);
        Ok(())
    }

    async fn add_document(&self, collection: &str, fields: Fields) -> Result<String> {
        let collection = collection_path(collection)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.set_document(&doc_path(&collection, &id), fields, WriteMode::Replace)
            .await?;
        Ok(id)
    }

    async fn query(&self, path: &str, filter: &Filter) -> Result<Vec<Record>> {
        let path = collection_path(path)?;
        let records = snapshot(&read(&self.remote), &path, None);
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }
}

/// Records of `path` modified strictly after `start_after`, oldest first.
fn snapshot(table: &Table, path: &str, start_after: Option<Timestamp>) -> Vec<Record> {
    let mut records: Vec<Record> = table
        .get(path)
        .map(|docs| {
            docs.values()
                .filter(|record| match start_after {
                    Some(start) => record.modified().is_some_and(|m| m > start),
                    None => true,
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    records.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    records
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::WhereOp;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_local_write_reaches_cache_and_remote() {
        let store = InMemoryStore::new();
        store
            .set_document(
                "howtos/h1",
                fields(json!({"title": "Shredder", "_modified": 1})),
                WriteMode::Merge,
            )
            .await
            .unwrap();

        let cached = store.cached_document("howtos/h1").await.unwrap().unwrap();
        assert_eq!(cached.get("title"), Some(&json!("Shredder")));
        assert_eq!(store.collection("howtos").len(), 1);
    }

    #[tokio::test]
    async fn test_remote_insert_only_cached_after_listening() {
        let store = InMemoryStore::new();
        store
            .insert_remote("howtos/h1", fields(json!({"_modified": 1})))
            .unwrap();
        assert!(store.cached_collection("howtos").await.unwrap().is_empty());

        let mut changes = store.listen_collection("howtos", None).await.unwrap();
        let first = changes.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(store.cached_collection("howtos").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_merge_overlays_fields() {
        let store = InMemoryStore::new();
        store
            .set_document("users/u1", fields(json!({"a": 1, "b": 1})), WriteMode::Merge)
            .await
            .unwrap();
        store
            .set_document("users/u1", fields(json!({"b": 2})), WriteMode::Merge)
            .await
            .unwrap();

        let record = store.get_document("users/u1").await.unwrap().unwrap();
        assert_eq!(record.get("a"), Some(&json!(1)));
        assert_eq!(record.get("b"), Some(&json!(2)));

        store
            .set_document("users/u1", fields(json!({"c": 3})), WriteMode::Replace)
            .await
            .unwrap();
        let record = store.get_document("users/u1").await.unwrap().unwrap();
        assert!(record.get("a").is_none());
    }

    #[tokio::test]
    async fn test_merge_into_tombstone_starts_empty() {
        let store = InMemoryStore::new();
        store
            .set_document("users/u1", fields(json!({"a": 1})), WriteMode::Merge)
            .await
            .unwrap();
        store
            .set_document("users/u1", Record::tombstone("u1", 5).into_fields(), WriteMode::Replace)
            .await
            .unwrap();
        store
            .set_document("users/u1", fields(json!({"b": 2})), WriteMode::Merge)
            .await
            .unwrap();

        let record = store.get_document("users/u1").await.unwrap().unwrap();
        assert!(!record.is_deleted());
        assert!(record.get("a").is_none());
    }

    #[tokio::test]
    async fn test_listener_respects_start_after() {
        let store = InMemoryStore::new();
        store.insert_remote("pins/a", fields(json!({"_modified": 1}))).unwrap();
        store.insert_remote("pins/b", fields(json!({"_modified": 2}))).unwrap();
        store.insert_remote("pins/c", fields(json!({}))).unwrap();

        let mut changes = store.listen_collection("pins", Some(1)).await.unwrap();
        let first = changes.next().await.unwrap().unwrap();
        let ids: Vec<_> = first.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["b"]);

        store.insert_remote("pins/d", fields(json!({"_modified": 3}))).unwrap();
        let second = changes.next().await.unwrap().unwrap();
        let ids: Vec<_> = second.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let store = InMemoryStore::new();
        let changes = store.listen_collection("pins", None).await.unwrap();
        let doc = store.listen_document("pins/a").await.unwrap();
        assert_eq!(store.listener_count(), 2);

        drop(changes);
        drop(doc);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_document_listener_follows_changes() {
        let store = InMemoryStore::new();
        let mut changes = store.listen_document("pins/a").await.unwrap();
        assert!(changes.next().await.unwrap().unwrap().is_none());

        store.insert_remote("pins/a", fields(json!({"n": 1}))).unwrap();
        let record = changes.next().await.unwrap().unwrap().unwrap();
        assert_eq!(record.get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = InMemoryStore::new();
        store.fail_writes_to("emails");
        let err = store.add_document("emails", Fields::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.restore_writes("emails");
        let id = store.add_document("emails", Fields::new()).await.unwrap();
        assert_eq!(store.collection("emails")[0].id(), id);
    }

    #[tokio::test]
    async fn test_query_filters_remote() {
        let store = InMemoryStore::new();
        store
            .insert_remote("howtos/a", fields(json!({"moderation": "draft"})))
            .unwrap();
        store
            .insert_remote("howtos/b", fields(json!({"moderation": "accepted"})))
            .unwrap();

        let filter = Filter::new("moderation", WhereOp::Eq, "accepted");
        let results = store.query("howtos", &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "b");
    }
}
