//! A pooled async client for the single external cache (Redis) that backs
//! both the config store and the quota engine's counters.
//!
//! Mirrors the shape of a typical internal Redis wrapper: a `deadpool`
//! manager around `redis::aio::ConnectionManager`, a cheap `Clone`able
//! handle in front of the pool, and latency-observed operations. Trimmed
//! down to the handful of commands this service actually issues
//! (`GET`/`SET`/`INCR`/`EXPIRE`/`TTL`/`SCAN`) rather than a generic
//! command passthrough.

use std::future::Future;
use std::time::{Duration, Instant};

use deadpool::managed::{Manager, Metrics, Pool, RecycleError, RecycleResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
    #[error("cache unavailable: {0}")]
    Pool(String),
}

struct ConnectionFactory {
    client: redis::Client,
}

impl Manager for ConnectionFactory {
    type Type = ConnectionManager;
    type Error = redis::RedisError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        ConnectionManager::new(self.client.clone()).await
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        redis::cmd("PING")
            .query_async::<()>(conn)
            .await
            .map_err(|err| RecycleError::message(err.to_string()))
    }
}

/// A cheap, `Clone`able handle onto a pooled Redis connection manager.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool<ConnectionFactory>,
}

impl RedisCache {
    /// Connects to a single Redis node at `host:port`. The connection is
    /// validated eagerly so that a misconfigured cache is a bootstrap
    /// failure, not a surprise on the first request.
    pub async fn connect(host: &str, port: u16) -> Result<Self, CacheError> {
        let url = format!("redis://{host}:{port}");
        let client = redis::Client::open(url).map_err(CacheError::Unavailable)?;
        let pool = Pool::builder(ConnectionFactory { client })
            .max_size(16)
            .build()
            .map_err(|err| CacheError::Pool(err.to_string()))?;

        let cache = Self { pool };
        cache.ping().await?;
        Ok(cache)
    }

    async fn conn(&self) -> Result<deadpool::managed::Object<ConnectionFactory>, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|err| CacheError::Pool(err.to_string()))
    }

    /// Times `fut` and emits a single `tracing` event recording the
    /// operation name, elapsed microseconds, and outcome. Every public
    /// method below runs through this so a slow or failing Redis node
    /// shows up in the logs without needing a metrics backend.
    async fn observe<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        let start = Instant::now();
        let result = fut.await;
        let elapsed_us = start.elapsed().as_micros() as u64;

        match &result {
            Ok(_) => tracing::debug!(operation, elapsed_us, "cache operation completed"),
            Err(err) => tracing::error!(operation, elapsed_us, error = %err, "cache operation failed"),
        }

        result
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.observe("ping", async {
            let mut conn = self.conn().await?;
            redis::cmd("PING")
                .query_async::<()>(&mut *conn)
                .await
                .map_err(CacheError::Unavailable)
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.observe("get", async {
            let mut conn = self.conn().await?;
            Ok(conn.get(key).await?)
        })
        .await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.observe("set", async {
            let mut conn = self.conn().await?;
            let _: () = conn.set(key, value).await?;
            Ok(())
        })
        .await
    }

    /// `INCR key`, returning the post-increment value.
    pub async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.observe("incr", async {
            let mut conn = self.conn().await?;
            Ok(conn.incr(key, 1).await?)
        })
        .await
    }

    /// `EXPIRE key ttl`.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.observe("expire", async {
            let mut conn = self.conn().await?;
            let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
            Ok(())
        })
        .await
    }

    /// `TTL key`. A negative TTL (key absent, or present with no expiry)
    /// is reported as `Duration::ZERO`; callers only use this value for
    /// logging, never for admission decisions.
    pub async fn ttl(&self, key: &str) -> Result<Duration, CacheError> {
        self.observe("ttl", async {
            let mut conn = self.conn().await?;
            let seconds: i64 = conn.ttl(key).await?;
            Ok(Duration::from_secs(seconds.max(0) as u64))
        })
        .await
    }

    /// Incremental `SCAN` over `pattern`, collecting matching keys across
    /// batches of `batch_hint` until the cursor returns to zero.
    pub async fn scan_keys(
        &self,
        pattern: &str,
        batch_hint: usize,
    ) -> Result<Vec<String>, CacheError> {
        self.observe("scan", async {
            let mut conn = self.conn().await?;
            let mut cursor: u64 = 0;
            let mut found = Vec::new();

            loop {
                let (next_cursor, mut batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(batch_hint)
                    .query_async(&mut *conn)
                    .await?;

                found.append(&mut batch);
                cursor = next_cursor;
                if cursor == 0 {
                    break;
                }
            }

            Ok(found)
        })
        .await
    }
}
