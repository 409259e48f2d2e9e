//! The local delivery delegate used by the mail-worker deployment: it
//! performs (a stub of) the actual send and always reports `SENT` on
//! success. Rate limiting is entirely upstream's concern; this delegate
//! never returns `REJECTED`.

use async_trait::async_trait;
use notification_model::{NotifResult, Notification, NotificationTypeConfig};
use quota_engine::{Delegate, DelegateError};

pub struct LocalMailDelegate;

impl LocalMailDelegate {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalMailDelegate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Delegate for LocalMailDelegate {
    async fn send(
        &self,
        notification: &Notification,
        _config: &NotificationTypeConfig,
    ) -> Result<NotifResult, DelegateError> {
        tracing::info!(recipient = %notification.recipient, "sending email to recipient");
        Ok(NotifResult::sent(format!(
            "notification sent to recipient ({})",
            notification.recipient
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notification_model::{Status, TimeUnit};

    #[tokio::test]
    async fn always_reports_sent_on_success() {
        let delegate = LocalMailDelegate::new();
        let notification = Notification {
            category: "News".into(),
            recipient: "a@a.a".into(),
            message: "hi".into(),
        };
        let config = NotificationTypeConfig {
            name: "News".into(),
            limit_count: 1,
            time_amount: 1,
            time_unit: TimeUnit::Day,
        };

        let result = delegate.send(&notification, &config).await.unwrap();
        assert_eq!(result.status, Status::Sent);
        assert!(result.response_message.contains("a@a.a"));
    }
}
