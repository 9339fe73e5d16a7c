//! Runtime configuration for the notification functions.

/// Site used for links in emails when none is configured.
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";

/// Role a receiver must hold to get direct messages when none is configured.
pub const DEFAULT_MESSAGE_ROLE: &str = "beta-tester";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionsConfig {
    /// Public base URL of the site, without trailing slash.
    pub site_url: String,
    /// Receivers must hold at least one of these roles to be messaged.
    pub message_roles: Vec<String>,
    /// Prepended to every collection name (e.g. `v3_`).
    pub collection_prefix: String,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            message_roles: vec![DEFAULT_MESSAGE_ROLE.to_string()],
            collection_prefix: String::new(),
        }
    }
}

impl FunctionsConfig {
    /// Absolute link to a site page.
    pub fn site_link(&self, page: &str) -> String {
        format!(
            "{}/{}",
            self.site_url.trim_end_matches('/'),
            page.trim_start_matches('/')
        )
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::with_prefix(&self.collection_prefix)
    }
}

/// Collection names used by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub users: String,
    pub messages: String,
    pub howtos: String,
    pub mappins: String,
    /// Outbound queue drained by the external mail delivery process.
    pub emails: String,
}

impl Endpoints {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            users: format!("{prefix}users"),
            messages: format!("{prefix}messages"),
            howtos: format!("{prefix}howtos"),
            mappins: format!("{prefix}mappins"),
            emails: format!("{prefix}emails"),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::with_prefix("")
    }
}
