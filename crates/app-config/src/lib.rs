//! Process bootstrap configuration: environment-sourced settings for the
//! rate limiter and delivery worker binaries, plus the shared logging
//! initializer both of them call first.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is set to {1:?}, which is not a valid integer")]
    InvalidInt(&'static str, String),
}

/// Settings shared by both binaries, sourced once from the process
/// environment at startup. A malformed value is a bootstrap failure,
/// not a runtime one: we fail fast rather than silently falling back.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub rate_limiter_http_port: u16,
    pub redis_host: String,
    pub redis_port: u16,
    pub notification_host: String,
    pub notification_http_port: u16,
    pub notification_grpc_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            debug: env_int("DEBUG", 1)? != 0,
            rate_limiter_http_port: env_int("RATE_LIMITER_HTTP_PORT", 8080)? as u16,
            redis_host: env_string("REDIS_HOST", "localhost"),
            redis_port: env_int("REDIS_EXPOSED_PORT", 6379)? as u16,
            notification_host: env_string("NOTIFICATION_HOST", "localhost"),
            notification_http_port: env_int("NOTIFICATION_HTTP_PORT", 8280)? as u16,
            notification_grpc_port: env_int("NOTIFICATION_GRPC_PORT", 8281)? as u16,
        })
    }

    pub fn redis_address(&self) -> String {
        format_address(&self.redis_host, self.redis_port)
    }

    pub fn notification_http_address(&self) -> String {
        format_address(&self.notification_host, self.notification_http_port)
    }

    pub fn notification_grpc_address(&self) -> String {
        format_address(&self.notification_host, self.notification_grpc_port)
    }
}

pub fn format_address(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_int(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidInt(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Installs the global `tracing` subscriber. `debug` toggles both the
/// default filter level and the output format: debug builds get
/// human-readable pretty output, everything else gets compact output
/// suited to log aggregation.
pub fn init_logging(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if debug {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}
