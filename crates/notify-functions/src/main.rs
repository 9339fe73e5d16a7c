//! notify-functions: replay creation events and print the queued emails.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use doc_sync::{Database, InMemoryStore};
use notify_functions::{
    EmailNotifier, Fixture, Functions, FunctionsConfig, TracingAlerter, config, replay,
};

#[derive(Parser, Debug)]
#[command(name = "notify-functions")]
#[command(about = "Replay creation events and print the emails they queue")]
struct Args {
    /// Path to a JSON fixture of users, auth emails and events
    #[arg(short, long)]
    fixture: PathBuf,

    /// Public site URL used for links in emails
    #[arg(long, env = "SITE_URL", default_value = config::DEFAULT_SITE_URL)]
    site_url: String,

    /// Role a receiver needs to accept direct messages (repeatable)
    #[arg(
        long = "message-role",
        env = "MESSAGE_ROLES",
        value_delimiter = ',',
        default_value = config::DEFAULT_MESSAGE_ROLE
    )]
    message_roles: Vec<String>,

    /// Prefix prepended to every collection name
    #[arg(long, default_value = "")]
    collection_prefix: String,

    /// Pretty-print the emails as one JSON array
    #[arg(long)]
    pretty: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    let default_filter = if args.verbose {
        "debug,notify_functions=debug,doc_sync=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let fixture = Fixture::load(&args.fixture)
        .with_context(|| format!("Failed to load fixture {:?}", args.fixture))?;
    let config = FunctionsConfig {
        site_url: args.site_url,
        message_roles: args.message_roles,
        collection_prefix: args.collection_prefix,
    };
    let emails_collection = config.endpoints().emails;

    let store = Arc::new(InMemoryStore::new());
    let functions = Functions::new(
        EmailNotifier::new(
            Database::new(Arc::clone(&store)),
            Arc::new(fixture.auth_directory()),
            config,
        ),
        Arc::new(TracingAlerter),
    );

    let report = replay(&functions, &fixture).await?;
    info!(
        "Replayed {} event(s): {} dispatched, {} failed, {} skipped, {} email(s) queued",
        fixture.events.len(),
        report.dispatched,
        report.failed,
        report.skipped,
        report.emails_queued
    );

    let emails = store.collection(&emails_collection);
    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&emails)?);
    } else {
        for email in &emails {
            println!("{}", serde_json::to_string(email)?);
        }
    }

    Ok(())
}
