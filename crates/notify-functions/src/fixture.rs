//! Replaying recorded creation events against an in-memory store.
//!
//! A fixture file looks like:
//!
//! ```json
//! {
//!   "users": [{ "_id": "user_1", "_authID": "auth_1", "displayName": "User 1" }],
//!   "auth": { "auth_1": "user1@example.org" },
//!   "events": [{ "collection": "howtos", "record": { "_id": "h1", ... } }]
//! }
//! ```

use crate::auth::{AuthDirectory, StaticAuthDirectory};
use crate::error::NotifyError;
use crate::triggers::{Functions, Trigger};

use doc_sync::path::doc_path;
use doc_sync::{DocumentStore, Fields, ID_FIELD};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<Fields>,
    /// Auth id -> login email.
    #[serde(default)]
    pub auth: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<FixtureEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureEvent {
    pub collection: String,
    pub record: Fields,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn auth_directory(&self) -> StaticAuthDirectory {
        self.auth.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Events whose handler ran to completion.
    pub dispatched: usize,
    /// Events whose handler failed.
    pub failed: usize,
    /// Events for collections without a trigger, or without an `_id`.
    pub skipped: usize,
    pub emails_queued: usize,
}

/// Seed the users, then write and dispatch each event in order.
///
/// Handler failures are counted, not returned: the alerter has already seen
/// them. Store failures while seeding abort the replay.
pub async fn replay<S, A>(
    functions: &Functions<S, A>,
    fixture: &Fixture,
) -> Result<ReplayReport, NotifyError>
where
    S: DocumentStore + 'static,
    A: AuthDirectory + ?Sized,
{
    let notifier = functions.notifier();
    let endpoints = notifier.endpoints();
    let db = notifier.database();
    let mut report = ReplayReport::default();

    for user in &fixture.users {
        let Some(id) = record_id(user) else {
            warn!("Skipping fixture user without {}", ID_FIELD);
            continue;
        };
        db.set_doc(&doc_path(&endpoints.users, id), user.clone())
            .await?;
    }

    for event in &fixture.events {
        let Some(trigger) = Trigger::for_collection(&event.collection, endpoints) else {
            debug!("No trigger for collection {}", event.collection);
            report.skipped += 1;
            continue;
        };
        let Some(id) = record_id(&event.record) else {
            warn!("Skipping {} event without {}", trigger, ID_FIELD);
            report.skipped += 1;
            continue;
        };

        let path = doc_path(&event.collection, id);
        db.set_doc(&path, event.record.clone()).await?;
        let Some(record) = db.store().get_document(&path).await? else {
            report.skipped += 1;
            continue;
        };

        match functions.dispatch(trigger, &record).await {
            Ok(outcome) => {
                report.dispatched += 1;
                report.emails_queued += outcome.emails_queued();
            }
            Err(_) => report.failed += 1,
        }
    }

    Ok(report)
}

fn record_id(fields: &Fields) -> Option<&str> {
    fields.get(ID_FIELD).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_missing_sections() {
        let fixture = Fixture::parse(r#"{"auth": {"a1": "a@example.org"}}"#).unwrap();
        assert!(fixture.users.is_empty());
        assert!(fixture.events.is_empty());
        assert_eq!(fixture.auth.len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            Fixture::parse("{ not json"),
            Err(FixtureError::Parse(_))
        ));
    }
}
