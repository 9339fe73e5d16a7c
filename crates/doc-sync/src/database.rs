//! Database: go-between for application stores and the document store.
//!
//! Consumers talk to `Database` rather than to the store directly so that
//! every write is stamped with `_modified`, deletes are always soft, and
//! collection reads are cache-first and incrementally merged.
//!
//! Subscriptions are lazy streams. Nothing is read until the first poll:
//!
//! 1. The cached records are read and emitted (newest first)
//! 2. A listener is opened starting after the newest cached `_modified`
//!    (from the beginning of time when the cache is empty)
//! 3. Every change batch is merged into the subscription's own table and
//!    the merged list is emitted again
//!
//! Dropping the stream drops the listener, which unsubscribes. Subscribing
//! again starts over from whatever the cache holds at that point.

use crate::clock::{Clock, SystemClock};
use crate::events::{EventBus, SnapshotSource, SyncEvent};
use crate::merge::MergeTable;
use crate::path::{DocPath, collection_path};
use crate::query::{Filter, WhereOp};
use crate::record::{Fields, MODIFIED_FIELD, Record, tombstone_fields};
use crate::store::{ChangeStream, DocumentStore, Result, WriteMode};

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Stream of full, newest-first collection snapshots.
pub type CollectionStream = BoxStream<'static, Result<Vec<Record>>>;

/// Stream of single-document snapshots. Missing and deleted documents are `None`.
pub type DocumentStream = BoxStream<'static, Result<Option<Record>>>;

/// Cache-first, merge-on-update access to a document store.
pub struct Database<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
}

impl<S> Clone for Database<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            events: Arc::clone(&self.events),
        }
    }
}

impl<S: DocumentStore + 'static> Database<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Event bus for monitoring. Subscribe with `db.events().subscribe(..)`.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Subscribe to a collection.
    ///
    /// The first item comes from the local cache. An empty first item means
    /// "nothing cached yet", not "confirmed empty".
    pub fn subscribe_collection(&self, path: &str) -> CollectionStream {
        let ctx = self.context(path);
        stream::unfold(CollectionState::Cached(ctx), |state| async move {
            match state {
                CollectionState::Cached(ctx) => {
                    let cached = match ctx.store.cached_collection(&ctx.path).await {
                        Ok(cached) => cached,
                        Err(e) => return Some((Err(e), CollectionState::Done)),
                    };
                    let table = MergeTable::from_records(cached);
                    let snapshot = table.newest_first();
                    ctx.snapshot_emitted(snapshot.len(), SnapshotSource::Cache);
                    Some((Ok(snapshot), CollectionState::Subscribe(ctx, table)))
                }
                CollectionState::Subscribe(ctx, table) => {
                    let start_after = table.latest_modified();
                    debug!(
                        "Listening to {} after {:?} ({} cached record(s))",
                        ctx.path,
                        start_after,
                        table.len()
                    );
                    let listening = ctx.store.listen_collection(&ctx.path, start_after).await;
                    match listening {
                        Ok(changes) => next_collection_update(ctx, table, changes).await,
                        Err(e) => Some((Err(e), CollectionState::Done)),
                    }
                }
                CollectionState::Live(ctx, table, changes) => {
                    next_collection_update(ctx, table, changes).await
                }
                CollectionState::Done => None,
            }
        })
        .boxed()
    }

    /// Subscribe to a single document: cached value first, then live updates.
    pub fn subscribe_document(&self, path: &str) -> DocumentStream {
        let ctx = self.context(path);
        stream::unfold(DocumentState::Cached(ctx), |state| async move {
            match state {
                DocumentState::Cached(ctx) => {
                    let cached = match ctx.store.cached_document(&ctx.path).await {
                        Ok(cached) => live(cached),
                        Err(e) => return Some((Err(e), DocumentState::Done)),
                    };
                    ctx.snapshot_emitted(usize::from(cached.is_some()), SnapshotSource::Cache);
                    Some((Ok(cached), DocumentState::Subscribe(ctx)))
                }
                DocumentState::Subscribe(ctx) => {
                    let listening = ctx.store.listen_document(&ctx.path).await;
                    match listening {
                        Ok(changes) => next_document_update(ctx, changes).await,
                        Err(e) => Some((Err(e), DocumentState::Done)),
                    }
                }
                DocumentState::Live(ctx, changes) => next_document_update(ctx, changes).await,
                DocumentState::Done => None,
            }
        })
        .boxed()
    }

    /// Merge `fields` into a document, stamping `_modified`.
    ///
    /// Later writes win per field.
    pub async fn set_doc(&self, path: &str, mut fields: Fields) -> Result<()> {
        let doc = DocPath::parse(path)?;
        let now = self.clock.now_millis();
        fields.insert(MODIFIED_FIELD.to_string(), Value::from(now));
        self.store
            .set_document(&doc.to_string(), fields, WriteMode::Merge)
            .await?;
        self.events.emit(SyncEvent::DocumentWritten {
            path: doc.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// Soft-delete a document.
    ///
    /// The document is emptied and flagged `_deleted` rather than removed, so
    /// caches that already hold it learn about the deletion through the same
    /// incremental listener as any other change.
    pub async fn delete_doc(&self, path: &str) -> Result<()> {
        let doc = DocPath::parse(path)?;
        let now = self.clock.now_millis();
        self.store
            .set_document(&doc.to_string(), tombstone_fields(now), WriteMode::Replace)
            .await?;
        self.events.emit(SyncEvent::DocumentDeleted {
            path: doc.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// One-shot filtered read. No caching, no merging; tombstones excluded.
    pub async fn query_collection(
        &self,
        path: &str,
        field: &str,
        op: WhereOp,
        value: impl Into<Value>,
    ) -> Result<Vec<Record>> {
        let path = collection_path(path)?;
        let filter = Filter::new(field, op, value);
        let records: Vec<Record> = self
            .store
            .query(&path, &filter)
            .await?
            .into_iter()
            .filter(|r| !r.is_deleted())
            .collect();
        self.events.emit(SyncEvent::QueryExecuted {
            path,
            field: field.to_string(),
            count: records.len(),
            timestamp: self.clock.now_millis(),
        });
        Ok(records)
    }

    fn context(&self, path: &str) -> SubscriptionContext<S> {
        SubscriptionContext {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            events: Arc::clone(&self.events),
            path: path.trim_matches('/').to_string(),
        }
    }
}

/// Everything a subscription stream needs, owned so the stream is `'static`.
struct SubscriptionContext<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    path: String,
}

impl<S> SubscriptionContext<S> {
    fn snapshot_emitted(&self, count: usize, source: SnapshotSource) {
        self.events.emit(SyncEvent::SnapshotEmitted {
            path: self.path.clone(),
            count,
            source,
            timestamp: self.clock.now_millis(),
        });
    }
}

enum CollectionState<S> {
    /// Not yet polled: read the cache next.
    Cached(SubscriptionContext<S>),
    /// Cache emitted: open the listener next.
    Subscribe(SubscriptionContext<S>, MergeTable),
    /// Listening for change batches.
    Live(SubscriptionContext<S>, MergeTable, ChangeStream<Vec<Record>>),
    Done,
}

enum DocumentState<S> {
    Cached(SubscriptionContext<S>),
    Subscribe(SubscriptionContext<S>),
    Live(SubscriptionContext<S>, ChangeStream<Option<Record>>),
    Done,
}

async fn next_collection_update<S>(
    ctx: SubscriptionContext<S>,
    mut table: MergeTable,
    mut changes: ChangeStream<Vec<Record>>,
) -> Option<(Result<Vec<Record>>, CollectionState<S>)> {
    match changes.next().await {
        Some(Ok(batch)) => {
            debug!("{}: merging {} updated record(s)", ctx.path, batch.len());
            table.apply(batch);
            let snapshot = table.newest_first();
            ctx.snapshot_emitted(snapshot.len(), SnapshotSource::Remote);
            Some((Ok(snapshot), CollectionState::Live(ctx, table, changes)))
        }
        Some(Err(e)) => Some((Err(e), CollectionState::Done)),
        None => None,
    }
}

async fn next_document_update<S>(
    ctx: SubscriptionContext<S>,
    mut changes: ChangeStream<Option<Record>>,
) -> Option<(Result<Option<Record>>, DocumentState<S>)> {
    match changes.next().await {
        Some(Ok(record)) => {
            let record = live(record);
            ctx.snapshot_emitted(usize::from(record.is_some()), SnapshotSource::Remote);
            Some((Ok(record), DocumentState::Live(ctx, changes)))
        }
        Some(Err(e)) => Some((Err(e), DocumentState::Done)),
        None => None,
    }
}

fn live(record: Option<Record>) -> Option<Record> {
    record.filter(|r| !r.is_deleted())
}
