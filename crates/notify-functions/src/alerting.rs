//! Error alerting for trigger handlers.
//!
//! Failures are reported, then returned unchanged. Nothing is retried.

use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use tracing::error;

#[async_trait]
pub trait ErrorAlerter: Send + Sync {
    /// Report a failed handler run.
    async fn alert(&self, trigger: &str, error: &NotifyError);
}

/// Reports failures to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerter;

#[async_trait]
impl ErrorAlerter for TracingAlerter {
    async fn alert(&self, trigger: &str, error: &NotifyError) {
        error!("Trigger {} failed: {}", trigger, error);
    }
}

/// A reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub trigger: String,
    pub message: String,
}

/// Keeps every alert in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingAlerter {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ErrorAlerter for RecordingAlerter {
    async fn alert(&self, trigger: &str, error: &NotifyError) {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Alert {
                trigger: trigger.to_string(),
                message: error.to_string(),
            });
    }
}

/// Run a handler, alerting on failure.
pub async fn with_error_alerting<T, A, F>(alerter: &A, trigger: &str, handler: F) -> Result<T>
where
    A: ErrorAlerter + ?Sized,
    F: Future<Output = Result<T>>,
{
    match handler.await {
        Ok(value) => Ok(value),
        Err(e) => {
            alerter.alert(trigger, &e).await;
            Err(e)
        }
    }
}
