//! doc-sync: cache-first document synchronization over an injected store.
//!
//! This crate provides:
//! - `Record` with `_id` / `_modified` / `_deleted` sync metadata
//! - The `DocumentStore` trait and an `InMemoryStore` implementation
//! - `MergeTable` for upsert-by-identifier reconciliation
//! - `Database`, which turns a store into deduplicated, deletion-filtered,
//!   newest-first snapshot streams plus stamped writes and soft deletes

pub mod clock;
pub mod database;
pub mod events;
pub mod memory;
pub mod merge;
pub mod path;
pub mod query;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::{CollectionStream, Database, DocumentStream};
pub use events::{EventBus, SnapshotSource, Subscription, SyncEvent};
pub use memory::InMemoryStore;
pub use merge::MergeTable;
pub use path::DocPath;
pub use query::{Filter, WhereOp};
pub use record::{DELETED_FIELD, Fields, ID_FIELD, MODIFIED_FIELD, Record, Timestamp};
pub use store::{ChangeStream, DocumentStore, StoreError, WriteMode};
