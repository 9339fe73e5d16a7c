//! Email composition for newly created messages and submissions.
//!
//! Every handler writes plain `EmailRecord` documents into the emails
//! collection. Delivery happens elsewhere.
//!
//! Direct messages queue two emails and then mark the message sent. The
//! three writes are not transactional: if a later write fails the earlier
//! emails stay queued and the message stays unsent, so a retry would queue
//! them again.

use crate::auth::AuthDirectory;
use crate::config::{Endpoints, FunctionsConfig};
use crate::error::{NotifyError, Result};
use crate::models::{EmailRecord, Howto, MapPin, Message, Moderation, User};
use crate::templates;

use doc_sync::path::doc_path;
use doc_sync::record::to_fields;
use doc_sync::{Database, DocumentStore, Fields, StoreError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// A user document together with its login email.
#[derive(Debug, Clone)]
pub struct UserAndEmail {
    pub user: User,
    pub email: String,
}

/// Result of handling a created message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEmailOutcome {
    /// Delivery checks failed; nothing was queued.
    Rejected,
    /// Message was already marked sent; nothing was queued.
    AlreadySent,
    /// Receiver and sender emails were queued and the message marked sent.
    Sent {
        receiver_email_id: String,
        sender_email_id: String,
    },
}

/// Result of handling a created submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionEmailOutcome {
    /// Submission is not awaiting moderation.
    Skipped,
    Queued { email_id: String },
}

pub struct EmailNotifier<S, A: ?Sized> {
    db: Database<S>,
    auth: Arc<A>,
    config: FunctionsConfig,
    endpoints: Endpoints,
}

impl<S, A> EmailNotifier<S, A>
where
    S: DocumentStore + 'static,
    A: AuthDirectory + ?Sized,
{
    pub fn new(db: Database<S>, auth: Arc<A>, config: FunctionsConfig) -> Self {
        let endpoints = config.endpoints();
        Self {
            db,
            auth,
            config,
            endpoints,
        }
    }

    pub fn database(&self) -> &Database<S> {
        &self.db
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn config(&self) -> &FunctionsConfig {
        &self.config
    }

    /// Load `users/{user_name}` and resolve its login email.
    pub async fn get_user_and_email(&self, user_name: &str) -> Result<UserAndEmail> {
        let user = self
            .load_user(user_name)
            .await?
            .ok_or_else(|| NotifyError::UserNotFound(user_name.to_string()))?;
        let email = self
            .auth
            .email_for(user.auth_key())
            .await?
            .ok_or_else(|| NotifyError::MissingEmail(user_name.to_string()))?;
        Ok(UserAndEmail { user, email })
    }

    /// Whether a message may be delivered to its receiver.
    ///
    /// The receiver must exist, hold one of the configured roles and have
    /// opted in to public contact. Users cannot message themselves.
    pub async fn is_valid_email_creation_request(&self, message: &Message) -> Result<bool> {
        if message.created_by.as_deref() == Some(message.to_user_name.as_str()) {
            debug!("Message {} rejected: sender is the receiver", message.id);
            return Ok(false);
        }
        let Some(receiver) = self.load_user(&message.to_user_name).await? else {
            debug!("Message {} rejected: unknown receiver", message.id);
            return Ok(false);
        };
        if !receiver.has_any_role(&self.config.message_roles) {
            debug!("Message {} rejected: receiver lacks a messaging role", message.id);
            return Ok(false);
        }
        if !receiver.is_contactable_by_public {
            debug!("Message {} rejected: receiver has not opted in", message.id);
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn create_message_emails(&self, message: &Message) -> Result<MessageEmailOutcome> {
        if !self.is_valid_email_creation_request(message).await? {
            return Ok(MessageEmailOutcome::Rejected);
        }
        if message.is_sent {
            return Ok(MessageEmailOutcome::AlreadySent);
        }

        let receiver = self.get_user_and_email(&message.to_user_name).await?;
        let receiver_email_id = self
            .queue_email(&EmailRecord {
                to: receiver.email.clone(),
                reply_to: Some(message.email.clone()),
                message: templates::receiver_message_email(&receiver.user, message, &self.config),
            })
            .await?;
        let sender_email_id = self
            .queue_email(&EmailRecord {
                to: message.email.clone(),
                reply_to: None,
                message: templates::sender_message_email(&receiver.user, message, &self.config),
            })
            .await?;

        let mut sent = Fields::new();
        sent.insert("isSent".to_string(), Value::Bool(true));
        self.db
            .set_doc(&doc_path(&self.endpoints.messages, &message.id), sent)
            .await?;

        info!("Queued message emails for message {}", message.id);
        Ok(MessageEmailOutcome::Sent {
            receiver_email_id,
            sender_email_id,
        })
    }

    pub async fn create_howto_submission_email(
        &self,
        howto: &Howto,
    ) -> Result<SubmissionEmailOutcome> {
        if howto.moderation != Moderation::AwaitingModeration {
            debug!("How-to {} is {:?}, no email", howto.id, howto.moderation);
            return Ok(SubmissionEmailOutcome::Skipped);
        }

        let author = self.get_user_and_email(&howto.created_by).await?;
        let email_id = self
            .queue_email(&EmailRecord {
                to: author.email,
                reply_to: None,
                message: templates::howto_submission_email(&author.user, howto, &self.config),
            })
            .await?;

        info!("Queued submission email for how-to {}", howto.id);
        Ok(SubmissionEmailOutcome::Queued { email_id })
    }

    pub async fn create_map_pin_submission_email(
        &self,
        pin: &MapPin,
    ) -> Result<SubmissionEmailOutcome> {
        if pin.moderation != Moderation::AwaitingModeration {
            debug!("Map pin {} is {:?}, no email", pin.id, pin.moderation);
            return Ok(SubmissionEmailOutcome::Skipped);
        }

        // Pins are keyed by their owner's user name
        let owner = self.get_user_and_email(&pin.id).await?;
        let email_id = self
            .queue_email(&EmailRecord {
                to: owner.email,
                reply_to: None,
                message: templates::map_pin_submission_email(&owner.user, pin, &self.config),
            })
            .await?;

        info!("Queued submission email for map pin {}", pin.id);
        Ok(SubmissionEmailOutcome::Queued { email_id })
    }

    async fn load_user(&self, user_name: &str) -> Result<Option<User>> {
        let path = doc_path(&self.endpoints.users, user_name);
        let Some(record) = self.db.store().get_document(&path).await? else {
            return Ok(None);
        };
        if record.is_deleted() {
            return Ok(None);
        }
        record
            .decode()
            .map(Some)
            .map_err(|e| NotifyError::InvalidRecord {
                id: path,
                reason: e.to_string(),
            })
    }

    async fn queue_email(&self, email: &EmailRecord) -> Result<String> {
        let fields = to_fields(email).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let id = self
            .db
            .store()
            .add_document(&self.endpoints.emails, fields)
            .await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthDirectory;
    use doc_sync::InMemoryStore;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn notifier(store: &Arc<InMemoryStore>) -> EmailNotifier<InMemoryStore, StaticAuthDirectory> {
        let auth: StaticAuthDirectory = [("auth_1", "user1@example.org")].into_iter().collect();
        EmailNotifier::new(
            Database::new(Arc::clone(store)),
            Arc::new(auth),
            FunctionsConfig::default(),
        )
    }

    fn seed_user(store: &InMemoryStore, value: Value) {
        let id = value["_id"].as_str().unwrap().to_string();
        store
            .insert_remote(&format!("users/{id}"), fields(value))
            .unwrap();
    }

    fn message(created_by: Option<&str>) -> Message {
        Message {
            id: "234dfsb".into(),
            created_by: created_by.map(str::to_string),
            email: "jeffery@example.org".into(),
            text: "Hi, can we be friends please?".into(),
            to_user_name: "user_1".into(),
            is_sent: false,
        }
    }

    #[tokio::test]
    async fn test_get_user_and_email_uses_auth_id() {
        let store = Arc::new(InMemoryStore::new());
        seed_user(&store, json!({"_id": "user_1", "_authID": "auth_1"}));

        let found = notifier(&store).get_user_and_email("user_1").await.unwrap();
        assert_eq!(found.email, "user1@example.org");
        assert_eq!(found.user.id, "user_1");
    }

    #[tokio::test]
    async fn test_get_user_and_email_errors() {
        let store = Arc::new(InMemoryStore::new());
        seed_user(&store, json!({"_id": "user_2"}));
        let notifier = notifier(&store);

        assert!(matches!(
            notifier.get_user_and_email("ghost").await,
            Err(NotifyError::UserNotFound(_))
        ));
        assert!(matches!(
            notifier.get_user_and_email("user_2").await,
            Err(NotifyError::MissingEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_validity_checks() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = notifier(&store);

        // Unknown receiver
        assert!(!notifier.is_valid_email_creation_request(&message(None)).await.unwrap());

        seed_user(&store, json!({"_id": "user_1", "userRoles": ["beta-tester"]}));
        // Not opted in
        assert!(!notifier.is_valid_email_creation_request(&message(None)).await.unwrap());

        seed_user(&store, json!({"_id": "user_1", "isContactableByPublic": true}));
        // Missing role
        assert!(!notifier.is_valid_email_creation_request(&message(None)).await.unwrap());

        seed_user(
            &store,
            json!({"_id": "user_1", "userRoles": ["beta-tester"], "isContactableByPublic": true}),
        );
        assert!(notifier.is_valid_email_creation_request(&message(None)).await.unwrap());
        assert!(notifier.is_valid_email_creation_request(&message(Some("user_9"))).await.unwrap());
        // Self-message
        assert!(
            !notifier
                .is_valid_email_creation_request(&message(Some("user_1")))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_already_sent_message_queues_nothing() {
        let store = Arc::new(InMemoryStore::new());
        seed_user(
            &store,
            json!({
                "_id": "user_1",
                "_authID": "auth_1",
                "userRoles": ["beta-tester"],
                "isContactableByPublic": true
            }),
        );
        let mut sent = message(None);
        sent.is_sent = true;

        let outcome = notifier(&store).create_message_emails(&sent).await.unwrap();
        assert_eq!(outcome, MessageEmailOutcome::AlreadySent);
        assert!(store.collection("emails").is_empty());
    }
}
