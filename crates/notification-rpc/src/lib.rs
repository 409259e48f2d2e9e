//! The typed RPC boundary between the rate limiter and the remote
//! delivery worker: a `tonic`/`prost`-generated `NotificationService`
//! with one `Send` method, plus a client-side `Delegate` adapter and a
//! server-side wrapper around any `Delegate`.

use std::sync::Arc;

use async_trait::async_trait;
use quota_engine::{Delegate, DelegateError};
use thiserror::Error;
use tonic::transport::Channel;
use tonic::{Request, Response, Status as RpcStatus};

pub mod proto {
    tonic::include_proto!("notification");
}

pub use proto::notification_service_client::NotificationServiceClient;
pub use proto::notification_service_server::{NotificationService, NotificationServiceServer};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to connect to notification service at {0}: {1}")]
    Connect(String, #[source] tonic::transport::Error),
}

impl From<notification_model::TimeUnit> for proto::TimeUnit {
    fn from(unit: notification_model::TimeUnit) -> Self {
        match unit {
            notification_model::TimeUnit::Second => proto::TimeUnit::Second,
            notification_model::TimeUnit::Minute => proto::TimeUnit::Minute,
            notification_model::TimeUnit::Hour => proto::TimeUnit::Hour,
            notification_model::TimeUnit::Day => proto::TimeUnit::Day,
        }
    }
}

impl From<proto::TimeUnit> for notification_model::TimeUnit {
    fn from(unit: proto::TimeUnit) -> Self {
        match unit {
            proto::TimeUnit::Second => notification_model::TimeUnit::Second,
            proto::TimeUnit::Minute => notification_model::TimeUnit::Minute,
            proto::TimeUnit::Hour => notification_model::TimeUnit::Hour,
            proto::TimeUnit::Day => notification_model::TimeUnit::Day,
        }
    }
}

impl From<&notification_model::Notification> for proto::Notification {
    fn from(n: &notification_model::Notification) -> Self {
        proto::Notification {
            category: n.category.clone(),
            recipient: n.recipient.clone(),
            message: n.message.clone(),
        }
    }
}

impl From<proto::Notification> for notification_model::Notification {
    fn from(n: proto::Notification) -> Self {
        notification_model::Notification {
            category: n.category,
            recipient: n.recipient,
            message: n.message,
        }
    }
}

impl From<&notification_model::NotificationTypeConfig> for proto::NotificationTypeConfig {
    fn from(c: &notification_model::NotificationTypeConfig) -> Self {
        proto::NotificationTypeConfig {
            name: c.name.clone(),
            limit_count: c.limit_count,
            time_amount: c.time_amount,
            time_unit: proto::TimeUnit::from(c.time_unit) as i32,
        }
    }
}

impl From<notification_model::Status> for proto::Status {
    fn from(status: notification_model::Status) -> Self {
        match status {
            notification_model::Status::Sent => proto::Status::Sent,
            notification_model::Status::Rejected => proto::Status::Rejected,
            notification_model::Status::InvalidNotification => proto::Status::InvalidNotification,
            notification_model::Status::InternalError => proto::Status::InternalError,
        }
    }
}

impl From<proto::Status> for notification_model::Status {
    fn from(status: proto::Status) -> Self {
        match status {
            proto::Status::Sent => notification_model::Status::Sent,
            proto::Status::Rejected => notification_model::Status::Rejected,
            proto::Status::InvalidNotification => notification_model::Status::InvalidNotification,
            proto::Status::InternalError => notification_model::Status::InternalError,
        }
    }
}

impl From<&notification_model::NotifResult> for proto::Result {
    fn from(result: &notification_model::NotifResult) -> Self {
        proto::Result {
            status: proto::Status::from(result.status) as i32,
            response_message: result.response_message.clone(),
        }
    }
}

impl From<proto::Result> for notification_model::NotifResult {
    fn from(result: proto::Result) -> Self {
        let status = proto::Status::try_from(result.status).unwrap_or(proto::Status::InternalError);
        notification_model::NotifResult {
            status: status.into(),
            response_message: result.response_message,
        }
    }
}

/// Server-side: wraps any `Delegate` (in practice the local mail
/// delegate) and exposes it as the `NotificationService` gRPC trait. The
/// worker never re-checks the quota; it trusts the caller already
/// admitted this send.
pub struct NotificationServiceImpl {
    delegate: Arc<dyn Delegate>,
}

impl NotificationServiceImpl {
    pub fn new(delegate: Arc<dyn Delegate>) -> Self {
        Self { delegate }
    }
}

#[tonic::async_trait]
impl NotificationService for NotificationServiceImpl {
    async fn send(
        &self,
        request: Request<proto::NotificationRequest>,
    ) -> Result<Response<proto::NotificationResponse>, RpcStatus> {
        let request = request.into_inner();
        let notification: notification_model::Notification = request
            .notification
            .ok_or_else(|| RpcStatus::invalid_argument("notification is required"))?
            .into();
        let config: notification_model::NotificationTypeConfig = request
            .config
            .map(|c| notification_model::NotificationTypeConfig {
                name: c.name,
                limit_count: c.limit_count,
                time_amount: c.time_amount,
                time_unit: proto::TimeUnit::try_from(c.time_unit)
                    .unwrap_or(proto::TimeUnit::Second)
                    .into(),
            })
            .unwrap_or(notification_model::NotificationTypeConfig {
                name: notification.category.clone(),
                limit_count: 0,
                time_amount: 1,
                time_unit: notification_model::TimeUnit::Second,
            });

        let result = self
            .delegate
            .send(&notification, &config)
            .await
            .map_err(|err| RpcStatus::internal(err.to_string()))?;

        Ok(Response::new(proto::NotificationResponse {
            result: Some((&result).into()),
        }))
    }
}

/// Client-side: a `Delegate` that forwards admitted notifications to the
/// remote delivery worker over gRPC. On transport failure it returns the
/// transport-error sentinel rather than propagating the raw RPC error,
/// so the quota engine's status-code mapping stays intact even when the
/// failure couldn't be classified by the worker.
pub struct RemoteDelegate {
    client: NotificationServiceClient<Channel>,
}

impl RemoteDelegate {
    pub async fn connect(address: String) -> Result<Self, RpcError> {
        let client = NotificationServiceClient::connect(address.clone())
            .await
            .map_err(|err| RpcError::Connect(address, err))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Delegate for RemoteDelegate {
    async fn send(
        &self,
        notification: &notification_model::Notification,
        config: &notification_model::NotificationTypeConfig,
    ) -> std::result::Result<notification_model::NotifResult, DelegateError> {
        let request = proto::NotificationRequest {
            notification: Some(notification.into()),
            config: Some(config.into()),
        };

        let mut client = self.client.clone();
        match client.send(Request::new(request)).await {
            Ok(response) => Ok(response
                .into_inner()
                .result
                .map(Into::into)
                .unwrap_or_else(notification_model::transport_error_sentinel)),
            Err(status) => {
                tracing::error!(error = %status, "error sending message over gRPC client");
                Err(DelegateError::Transport(status.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notification_model::{Notification, NotificationTypeConfig, Status, TimeUnit};

    struct StubDelegate {
        fail: bool,
    }

    #[async_trait]
    impl Delegate for StubDelegate {
        async fn send(
            &self,
            notification: &Notification,
            _config: &NotificationTypeConfig,
        ) -> std::result::Result<notification_model::NotifResult, DelegateError> {
            if self.fail {
                return Err(DelegateError::Transport("boom".into()));
            }
            Ok(notification_model::NotifResult::sent(format!(
                "notification sent to recipient ({})",
                notification.recipient
            )))
        }
    }

    fn sample_request() -> proto::NotificationRequest {
        proto::NotificationRequest {
            notification: Some(proto::Notification {
                category: "News".into(),
                recipient: "a@a.a".into(),
                message: "hi".into(),
            }),
            config: Some(proto::NotificationTypeConfig {
                name: "News".into(),
                limit_count: 1,
                time_amount: 1,
                time_unit: proto::TimeUnit::Day as i32,
            }),
        }
    }

    #[tokio::test]
    async fn server_forwards_to_delegate_and_reports_sent() {
        let service = NotificationServiceImpl::new(Arc::new(StubDelegate { fail: false }));
        let response = service
            .send(Request::new(sample_request()))
            .await
            .unwrap()
            .into_inner();

        let result: notification_model::NotifResult = response.result.unwrap().into();
        assert_eq!(result.status, Status::Sent);
    }

    #[tokio::test]
    async fn server_surfaces_delegate_failure_as_rpc_status() {
        let service = NotificationServiceImpl::new(Arc::new(StubDelegate { fail: true }));
        let err = service.send(Request::new(sample_request())).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
    }

    #[test]
    fn time_unit_roundtrips_through_proto() {
        for unit in [TimeUnit::Second, TimeUnit::Minute, TimeUnit::Hour, TimeUnit::Day] {
            let proto_unit: proto::TimeUnit = unit.into();
            let back: TimeUnit = proto_unit.into();
            assert_eq!(unit, back);
        }
    }
}
