//! Platform document models as stored in their collections.
//!
//! Field names follow the stored JSON: camelCase, with `_`-prefixed
//! metadata (`_id`, `_createdBy`, `_authID`). Unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Moderation state of user-submitted content.
///
/// Missing or unrecognized states decode as `Unknown`, which never
/// triggers a submission email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Moderation {
    Draft,
    AwaitingModeration,
    Rejected,
    Accepted,
    ImprovementsNeeded,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User name, also the document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Id of the login account holding the user's email address.
    #[serde(rename = "_authID", default)]
    pub auth_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_roles: Vec<String>,
    /// Opt-in for receiving direct messages.
    #[serde(default)]
    pub is_contactable_by_public: bool,
}

impl User {
    /// Name used to greet the user in emails.
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.user_name.as_deref())
            .unwrap_or(&self.id)
    }

    /// Key used to look the user up in the auth directory.
    pub fn auth_key(&self) -> &str {
        self.auth_id.as_deref().unwrap_or(&self.id)
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        self.user_roles.iter().any(|role| roles.contains(role))
    }
}

/// A direct message from a visitor or user to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    /// Sender user name, when sent by a signed-in user.
    #[serde(rename = "_createdBy", default)]
    pub created_by: Option<String>,
    /// Sender email address.
    pub email: String,
    pub text: String,
    pub to_user_name: String,
    #[serde(default)]
    pub is_sent: bool,
}

/// A how-to guide submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Howto {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_createdBy")]
    pub created_by: String,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub moderation: Moderation,
}

/// A map pin submission. Each user owns one pin, keyed by user name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPin {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub moderation: Moderation,
    #[serde(rename = "type", default)]
    pub pin_type: Option<String>,
}

/// Outbound email document, consumed by the mail delivery process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub to: String,
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub message: EmailMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_defaults_and_greeting() {
        let user: User = serde_json::from_value(json!({"_id": "user_1", "_modified": 3})).unwrap();
        assert_eq!(user.greeting_name(), "user_1");
        assert_eq!(user.auth_key(), "user_1");
        assert!(!user.is_contactable_by_public);

        let user: User = serde_json::from_value(json!({
            "_id": "user_1",
            "_authID": "auth_1",
            "displayName": "User 1",
            "userRoles": ["beta-tester"],
        }))
        .unwrap();
        assert_eq!(user.greeting_name(), "User 1");
        assert_eq!(user.auth_key(), "auth_1");
        assert!(user.has_any_role(&["beta-tester".to_string()]));
    }

    #[test]
    fn test_moderation_names() {
        let howto: Howto = serde_json::from_value(json!({
            "_id": "h1",
            "_createdBy": "user_1",
            "title": "Mock Howto",
            "moderation": "awaiting-moderation",
        }))
        .unwrap();
        assert_eq!(howto.moderation, Moderation::AwaitingModeration);
        assert_eq!(
            serde_json::to_value(Moderation::ImprovementsNeeded).unwrap(),
            json!("improvements-needed")
        );
    }

    #[test]
    fn test_missing_or_unknown_moderation_decodes_as_unknown() {
        let pin: MapPin =
            serde_json::from_value(json!({"_id": "user_1", "type": "workspace"})).unwrap();
        assert_eq!(pin.moderation, Moderation::Unknown);

        let howto: Howto = serde_json::from_value(json!({
            "_id": "h1",
            "_createdBy": "user_1",
            "title": "Mock Howto",
            "moderation": "awaiting-review",
        }))
        .unwrap();
        assert_eq!(howto.moderation, Moderation::Unknown);
    }

    #[test]
    fn test_email_record_shape() {
        let email = EmailRecord {
            to: "a@example.org".into(),
            reply_to: None,
            message: EmailMessage {
                subject: "s".into(),
                html: "h".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&email).unwrap(),
            json!({"to": "a@example.org", "message": {"subject": "s", "html": "h"}})
        );
    }
}
