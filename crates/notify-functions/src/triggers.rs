//! Creation triggers: decode a created document and run its handler.
//!
//! `Functions::dispatch` is the single entry point. `TriggerWatcher` drives
//! it from a live collection listener, firing once per new document id.

use crate::alerting::{ErrorAlerter, with_error_alerting};
use crate::auth::AuthDirectory;
use crate::config::Endpoints;
use crate::error::{NotifyError, Result};
use crate::notifier::{EmailNotifier, MessageEmailOutcome, SubmissionEmailOutcome};

use doc_sync::{DocumentStore, MergeTable, Record, StoreError};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    MessageCreated,
    HowtoCreated,
    MapPinCreated,
}

impl Trigger {
    pub const ALL: [Trigger; 3] = [
        Trigger::MessageCreated,
        Trigger::HowtoCreated,
        Trigger::MapPinCreated,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Trigger::MessageCreated => "message_created",
            Trigger::HowtoCreated => "howto_created",
            Trigger::MapPinCreated => "mappin_created",
        }
    }

    /// Collection whose new documents fire this trigger.
    pub fn collection(self, endpoints: &Endpoints) -> &str {
        match self {
            Trigger::MessageCreated => endpoints.messages.as_str(),
            Trigger::HowtoCreated => endpoints.howtos.as_str(),
            Trigger::MapPinCreated => endpoints.mappins.as_str(),
        }
    }

    pub fn for_collection(collection: &str, endpoints: &Endpoints) -> Option<Trigger> {
        let collection = collection.trim_matches('/');
        Self::ALL
            .into_iter()
            .find(|trigger| trigger.collection(endpoints) == collection)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Message(MessageEmailOutcome),
    Submission(SubmissionEmailOutcome),
}

impl DispatchOutcome {
    /// Number of emails the handler queued.
    pub fn emails_queued(&self) -> usize {
        match self {
            DispatchOutcome::Message(MessageEmailOutcome::Sent { .. }) => 2,
            DispatchOutcome::Submission(SubmissionEmailOutcome::Queued { .. }) => 1,
            _ => 0,
        }
    }
}

/// Handlers plus the alerter their failures are reported to.
pub struct Functions<S, A: ?Sized> {
    notifier: EmailNotifier<S, A>,
    alerter: Arc<dyn ErrorAlerter>,
}

impl<S, A> Functions<S, A>
where
    S: DocumentStore + 'static,
    A: AuthDirectory + ?Sized,
{
    pub fn new(notifier: EmailNotifier<S, A>, alerter: Arc<dyn ErrorAlerter>) -> Self {
        Self { notifier, alerter }
    }

    pub fn notifier(&self) -> &EmailNotifier<S, A> {
        &self.notifier
    }

    /// Run the handler for a created record. Failures are alerted, then
    /// returned.
    pub async fn dispatch(&self, trigger: Trigger, record: &Record) -> Result<DispatchOutcome> {
        with_error_alerting(self.alerter.as_ref(), trigger.name(), async {
            match trigger {
                Trigger::MessageCreated => {
                    let message = decode(record)?;
                    let outcome = self.notifier.create_message_emails(&message).await?;
                    Ok(DispatchOutcome::Message(outcome))
                }
                Trigger::HowtoCreated => {
                    let howto = decode(record)?;
                    let outcome = self.notifier.create_howto_submission_email(&howto).await?;
                    Ok(DispatchOutcome::Submission(outcome))
                }
                Trigger::MapPinCreated => {
                    let pin = decode(record)?;
                    let outcome = self.notifier.create_map_pin_submission_email(&pin).await?;
                    Ok(DispatchOutcome::Submission(outcome))
                }
            }
        })
        .await
    }
}

fn decode<T: DeserializeOwned>(record: &Record) -> Result<T> {
    record.decode().map_err(|e| NotifyError::InvalidRecord {
        id: record.id().to_string(),
        reason: e.to_string(),
    })
}

/// Background task firing a trigger for every document created in its
/// collection after the watcher started.
pub struct TriggerWatcher;

impl TriggerWatcher {
    /// Start watching, then hand the dispatch loop to the tokio runtime.
    ///
    /// The baseline snapshot is taken before this returns, so any document
    /// written afterwards fires. Later changes are read incrementally, after
    /// the newest baseline `_modified`; creations must carry `_modified`,
    /// which `Database::set_doc` always stamps.
    ///
    /// Only ids missing from the baseline and not dispatched before fire.
    /// Updates and tombstones are ignored. Handler failures are alerted and
    /// the loop keeps going. The task fails with `StoreError::Closed` when the
    /// listener ends, and stops when the handle is aborted.
    pub async fn spawn<S, A>(
        functions: Arc<Functions<S, A>>,
        trigger: Trigger,
    ) -> Result<JoinHandle<Result<()>>>
    where
        S: DocumentStore + 'static,
        A: AuthDirectory + ?Sized + 'static,
    {
        let collection = trigger
            .collection(functions.notifier.endpoints())
            .to_string();
        let store = functions.notifier.database().store();

        let mut initial = store.listen_collection(&collection, None).await?;
        let baseline = match initial.next().await {
            Some(batch) => MergeTable::from_records(batch?),
            None => return Err(StoreError::Closed(collection).into()),
        };
        let mut seen: HashSet<String> = baseline.ids().map(str::to_string).collect();

        // Registering the narrower listener before dropping the first one
        // leaves no gap; anything written in between is in its first batch.
        let changes = match baseline.latest_modified() {
            Some(after) => store.listen_collection(&collection, Some(after)).await?,
            None => initial,
        };
        info!(
            "Watching {} for {} ({} existing document(s))",
            collection,
            trigger,
            seen.len()
        );

        Ok(tokio::spawn(async move {
            let mut changes = changes;
            while let Some(batch) = changes.next().await {
                for record in batch? {
                    if !seen.insert(record.id().to_string()) {
                        continue;
                    }
                    if record.is_deleted() {
                        debug!("Skipping deleted {}/{}", collection, record.id());
                        continue;
                    }
                    if let Err(e) = functions.dispatch(trigger, &record).await {
                        warn!("{} failed for {}: {}", trigger, record.id(), e);
                    }
                }
            }
            Err(StoreError::Closed(collection).into())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::RecordingAlerter;
    use crate::auth::StaticAuthDirectory;
    use crate::config::FunctionsConfig;
    use doc_sync::{Database, InMemoryStore};
    use serde_json::json;

    #[test]
    fn test_trigger_collections() {
        let endpoints = Endpoints::with_prefix("test_");
        assert_eq!(Trigger::HowtoCreated.collection(&endpoints), "test_howtos");
        assert_eq!(
            Trigger::for_collection("test_mappins", &endpoints),
            Some(Trigger::MapPinCreated)
        );
        assert_eq!(Trigger::for_collection("howtos", &endpoints), None);
        assert_eq!(Trigger::MessageCreated.to_string(), "message_created");
    }

    #[tokio::test]
    async fn test_undecodable_record_is_alerted() {
        let store = Arc::new(InMemoryStore::new());
        let alerter = Arc::new(RecordingAlerter::new());
        let functions = Functions::new(
            EmailNotifier::new(
                Database::new(store),
                Arc::new(StaticAuthDirectory::new()),
                FunctionsConfig::default(),
            ),
            alerter.clone(),
        );

        // No `_createdBy` or title
        let mut fields = doc_sync::Fields::new();
        fields.insert("moderation".into(), json!("awaiting-moderation"));
        let record = Record::new("h1", fields);

        let result = functions.dispatch(Trigger::HowtoCreated, &record).await;
        assert!(matches!(result, Err(NotifyError::InvalidRecord { .. })));
        assert_eq!(alerter.alerts().len(), 1);
        assert_eq!(alerter.alerts()[0].trigger, "howto_created");
    }
}
