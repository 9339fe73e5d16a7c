//! Lookup of login email addresses, which live with the auth provider
//! rather than in the user documents.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait AuthDirectory: Send + Sync {
    /// Email address of a login account, if it has one.
    async fn email_for(&self, auth_id: &str) -> Result<Option<String>>;
}

/// Fixed auth id -> email table.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthDirectory {
    emails: HashMap<String, String>,
}

impl StaticAuthDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, auth_id: impl Into<String>, email: impl Into<String>) {
        self.emails.insert(auth_id.into(), email.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticAuthDirectory {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            emails: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl AuthDirectory for StaticAuthDirectory {
    async fn email_for(&self, auth_id: &str) -> Result<Option<String>> {
        Ok(self.emails.get(auth_id).cloned())
    }
}
