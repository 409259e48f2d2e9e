//! The HTTP-facing rate limiter process: accepts `POST /send` and the
//! `/type/*` config routes, admits notifications against Redis-backed
//! quotas, and forwards admitted sends to the delivery worker over gRPC.

use std::sync::Arc;

use app_config::AppConfig;
use config_store::CacheConfigStore;
use notification_cache::RedisCache;
use notification_rpc::RemoteDelegate;
use quota_engine::QuotaEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    app_config::init_logging(config.debug);

    let cache = RedisCache::connect(&config.redis_host, config.redis_port)
        .await
        .map_err(|err| anyhow::anyhow!("error connecting to Redis at {}: {err}", config.redis_address()))?;

    let config_store = Arc::new(CacheConfigStore::new(Arc::new(cache.clone())));
    let delegate = RemoteDelegate::connect(format!("http://{}", config.notification_grpc_address()))
        .await
        .map_err(|err| anyhow::anyhow!("error dialing delivery worker: {err}"))?;

    let engine = Arc::new(QuotaEngine::new(
        config_store.clone(),
        Arc::new(cache),
        Arc::new(delegate),
    ));

    let state = edge_http::AppState::new(engine, Some(config_store));
    let router = edge_http::make_router(state);

    let address = format!("0.0.0.0:{}", config.rate_limiter_http_port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "HTTP channel listening");

    axum::serve(listener, router).await?;
    Ok(())
}
