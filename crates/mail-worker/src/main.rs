//! The delivery worker process: serves the `NotificationService` gRPC
//! endpoint, always accepting and reporting `SENT`. Quota admission has
//! already happened upstream by the time a request reaches here.

use std::sync::Arc;

use app_config::AppConfig;
use delivery_mail::LocalMailDelegate;
use notification_rpc::{NotificationServiceImpl, NotificationServiceServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    app_config::init_logging(config.debug);

    let address = format!("0.0.0.0:{}", config.notification_grpc_port).parse()?;
    let service = NotificationServiceImpl::new(Arc::new(LocalMailDelegate::new()));

    tracing::info!(address = %address, "TCP channel listening");

    tonic::transport::Server::builder()
        .add_service(NotificationServiceServer::new(service))
        .serve(address)
        .await?;

    Ok(())
}
