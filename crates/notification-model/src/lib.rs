//! Shared wire and domain types for the notification rate limiter: the
//! `Notification` request payload, the `NotificationTypeConfig` quota
//! policy, and the uniform `Result` response envelope.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub const CONFIG_KEY_PREFIX: &str = "NOTIFICATION_CONFIG";

/// A notification send request, as received at the edge or carried over
/// the RPC boundary to the delivery delegate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Notification {
    #[serde(default)]
    #[validate(length(min = 1, message = "NotificationType is required"))]
    pub category: String,
    #[serde(default)]
    #[validate(
        length(min = 1, message = "Recipient is required"),
        email(message = "Recipient must be a valid email address")
    )]
    pub recipient: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
}

/// The unit tag a `NotificationTypeConfig.timeAmount` is measured in.
///
/// The tag string, not the resolved `Duration`, is what gets persisted:
/// storing a raw duration would make the unit unrecoverable on listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    #[serde(rename = "SECOND")]
    Second,
    #[serde(rename = "MINUTE")]
    Minute,
    #[serde(rename = "HOUR")]
    Hour,
    #[serde(rename = "DAY")]
    Day,
}

impl TimeUnit {
    pub fn as_duration(self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(60 * 60),
            TimeUnit::Day => Duration::from_secs(60 * 60 * 24),
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            TimeUnit::Second => "SECOND",
            TimeUnit::Minute => "MINUTE",
            TimeUnit::Hour => "HOUR",
            TimeUnit::Day => "DAY",
        }
    }
}

/// The quota policy for one notification category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NotificationTypeConfig {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(range(min = 1, message = "limitCount must be >= 1"))]
    #[serde(rename = "limitCount")]
    pub limit_count: i64,
    #[validate(range(min = 1, message = "timeAmount must be >= 1"))]
    #[serde(rename = "timeAmount")]
    pub time_amount: i64,
    #[serde(rename = "timeUnit")]
    pub time_unit: TimeUnit,
}

impl NotificationTypeConfig {
    /// The admission window: `timeAmount` multiplied by the duration of
    /// one `timeUnit`.
    pub fn window(&self) -> Duration {
        self.time_unit.as_duration() * self.time_amount as u32
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The reserved cache key this config is persisted under.
    pub fn cache_key(name: &str) -> String {
        format!("{CONFIG_KEY_PREFIX}:{name}")
    }
}

/// Outcome of an admission attempt or a delivery attempt, on the wire in
/// both the HTTP and RPC surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Sent,
    Rejected,
    InvalidNotification,
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifResult {
    pub status: Status,
    pub response_message: String,
}

impl NotifResult {
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            status: Status::Sent,
            response_message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: Status::Rejected,
            response_message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: Status::InvalidNotification,
            response_message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: Status::InternalError,
            response_message: message.into(),
        }
    }
}

/// The sentinel the remote RPC delegate returns when the transport itself
/// failed and no delegate-side result could be classified.
pub fn transport_error_sentinel() -> NotifResult {
    NotifResult::internal_error("internal server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrips_through_json_with_tag_preserved() {
        let config = NotificationTypeConfig {
            name: "News".into(),
            limit_count: 1,
            time_amount: 1,
            time_unit: TimeUnit::Day,
        };

        let json = config.to_json().unwrap();
        assert!(json.contains("\"timeUnit\":\"DAY\""));

        let decoded = NotificationTypeConfig::from_json(&json).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn unknown_time_unit_tag_fails_to_decode() {
        let raw = r#"{"name":"News","limitCount":1,"timeAmount":1,"timeUnit":"FORTNIGHT"}"#;
        assert!(NotificationTypeConfig::from_json(raw).is_err());
    }

    #[test]
    fn window_multiplies_amount_by_unit() {
        let config = NotificationTypeConfig {
            name: "Status".into(),
            limit_count: 2,
            time_amount: 3,
            time_unit: TimeUnit::Minute,
        };
        assert_eq!(config.window(), Duration::from_secs(180));
    }

    #[test]
    fn valid_notification_passes_validation() {
        let n = Notification {
            category: "News".into(),
            recipient: "a@a.a".into(),
            message: "hi".into(),
        };
        assert!(n.validate().is_ok());
    }

    #[test]
    fn notification_with_bad_email_fails_validation() {
        let n = Notification {
            category: "News".into(),
            recipient: "not-an-email".into(),
            message: "hi".into(),
        };
        let errors = n.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("recipient"));
    }

    #[test]
    fn cache_key_uses_reserved_prefix() {
        assert_eq!(
            NotificationTypeConfig::cache_key("News"),
            "NOTIFICATION_CONFIG:News"
        );
    }
}
