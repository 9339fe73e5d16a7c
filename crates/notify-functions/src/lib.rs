//! notify-functions: email notifications fired by newly created documents.
//!
//! Handlers read users and write queued emails through a `doc_sync::Database`,
//! so they run unchanged against any `DocumentStore`. The binary replays a
//! fixture of creation events against an `InMemoryStore`.

pub mod alerting;
pub mod auth;
pub mod config;
pub mod error;
pub mod fixture;
pub mod models;
pub mod notifier;
pub mod templates;
pub mod triggers;

// Re-export key types for convenience
pub use alerting::{Alert, ErrorAlerter, RecordingAlerter, TracingAlerter, with_error_alerting};
pub use auth::{AuthDirectory, StaticAuthDirectory};
pub use config::{Endpoints, FunctionsConfig};
pub use error::{NotifyError, Result};
pub use fixture::{Fixture, FixtureError, FixtureEvent, ReplayReport, replay};
pub use models::{EmailMessage, EmailRecord, Howto, MapPin, Message, Moderation, User};
pub use notifier::{EmailNotifier, MessageEmailOutcome, SubmissionEmailOutcome, UserAndEmail};
pub use triggers::{DispatchOutcome, Functions, Trigger, TriggerWatcher};
