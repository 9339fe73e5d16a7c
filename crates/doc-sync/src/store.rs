//! DocumentStore trait abstraction over the backing document database.
//!
//! Implementations:
//! - `InMemoryStore` - For testing and local replay
//!
//! The store keeps two views of every collection: the remote (authoritative)
//! state and the local cache this client has already seen. Cache reads never
//! touch the remote; listeners read the remote and fill the cache.

use crate::query::Filter;
use crate::record::{Fields, Record, Timestamp};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A listener ended while its consumer still expected changes.
    #[error("Listener closed: {0}")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Stream of change notifications. Dropping it unsubscribes.
pub type ChangeStream<T> = BoxStream<'static, Result<T>>;

/// How `set_document` combines new fields with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Overlay the given fields onto the existing ones.
    ///
    /// Merging into a soft-deleted document starts from an empty field set.
    #[default]
    Merge,
    /// Replace every field of the document.
    Replace,
}

/// Document database abstraction.
///
/// Implementations must be `Send + Sync` so one store can back many
/// concurrent subscriptions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Records of a collection present in the local cache, oldest first.
    ///
    /// Tombstones are included.
    async fn cached_collection(&self, path: &str) -> Result<Vec<Record>>;

    /// A document from the local cache.
    async fn cached_document(&self, path: &str) -> Result<Option<Record>>;

    /// Listen to a collection.
    ///
    /// Each item is the full set of remote records whose `_modified` is
    /// strictly after `start_after` (every record when `None`), oldest first,
    /// tombstones included. The first item reflects the state at
    /// registration, later items follow every remote change.
    async fn listen_collection(
        &self,
        path: &str,
        start_after: Option<Timestamp>,
    ) -> Result<ChangeStream<Vec<Record>>>;

    /// Listen to a single document, first at registration then on change.
    async fn listen_document(&self, path: &str) -> Result<ChangeStream<Option<Record>>>;

    /// One-shot remote read of a document.
    async fn get_document(&self, path: &str) -> Result<Option<Record>>;

    /// Write a document.
    async fn set_document(&self, path: &str, fields: Fields, mode: WriteMode) -> Result<()>;

    /// Add a document under a generated id and return the id.
    async fn add_document(&self, collection: &str, fields: Fields) -> Result<String>;

    /// One-shot remote filtered read of a collection.
    async fn query(&self, path: &str, filter: &Filter) -> Result<Vec<Record>>;
}

// Implement DocumentStore for Arc<T> where T: DocumentStore
// This allows sharing one store between a Database and test assertions
#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    async fn cached_collection(&self, path: &str) -> Result<Vec<Record>> {
        (**self).cached_collection(path).await
    }

    async fn cached_document(&self, path: &str) -> Result<Option<Record>> {
        (**self).cached_document(path).await
    }

    async fn listen_collection(
        &self,
        path: &str,
        start_after: Option<Timestamp>,
    ) -> Result<ChangeStream<Vec<Record>>> {
        (**self).listen_collection(path, start_after).await
    }

    async fn listen_document(&self, path: &str) -> Result<ChangeStream<Option<Record>>> {
        (**self).listen_document(path).await
    }

    async fn get_document(&self, path: &str) -> Result<Option<Record>> {
        (**self).get_document(path).await
    }

    async fn set_document(&self, path: &str, fields: Fields, mode: WriteMode) -> Result<()> {
        (**self).set_document(path, fields, mode).await
    }

    async fn add_document(&self, collection: &str, fields: Fields) -> Result<String> {
        (**self).add_document(collection, fields).await
    }

    async fn query(&self, path: &str, filter: &Filter) -> Result<Vec<Record>> {
        (**self).query(path, filter).await
    }
}
