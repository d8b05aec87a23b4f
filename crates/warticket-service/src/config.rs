//! Service configuration.

use std::time::Duration;

use warticket_core::FULFILLMENT_QUEUE;

/// Durable store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store; nothing survives a restart.
    Memory,
    /// `PostgreSQL` via `DATABASE_URL`.
    Postgres,
    /// `RocksDB` under `DATA_DIR` (requires the `rocksdb-backend` feature).
    Rocks,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "rocksdb" | "rocks" => Ok(Self::Rocks),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Durable store backend (default: memory).
    pub store_backend: StoreBackend,

    /// `PostgreSQL` connection URL.
    pub database_url: Option<String>,

    /// Maximum `PostgreSQL` pool size (default: 10).
    pub database_max_connections: u32,

    /// Path to `RocksDB` data directory (default: "/data/warticket").
    pub data_dir: String,

    /// Redis URL for the stock cache and job queue. In-memory backends when absent.
    pub redis_url: Option<String>,

    /// Root directory of the filesystem blob store. In-memory blobs when absent.
    pub blob_dir: Option<String>,

    /// Public base URL that signed blob URLs are rooted at.
    pub public_base_url: String,

    /// HMAC secret for signed blob URLs.
    pub blob_signing_secret: String,

    /// Lifetime of signed blob URLs (default: 15 minutes).
    pub signed_url_ttl: Duration,

    /// Lifetime of a hydrated stock ledger key (default: 1 hour).
    pub stock_cache_ttl: Duration,

    /// HS256 secret used to validate bearer tokens.
    pub jwt_secret: String,

    /// Shared secret for payment webhook signatures. Unsigned webhooks are accepted when absent.
    pub payment_webhook_secret: Option<String>,

    /// Name of the fulfillment queue (default: "`ticket_generation`").
    pub fulfillment_queue: String,

    /// Deliveries of one fulfillment job before it is dead-lettered (default: 5).
    pub max_delivery_attempts: u32,

    /// First redelivery backoff (default: 500 ms).
    pub retry_initial_backoff: Duration,

    /// Redelivery backoff cap (default: 30 s).
    pub retry_max_backoff: Duration,

    /// Whether this process runs the fulfillment worker (default: true).
    pub run_worker: bool,

    /// Order API requests admitted per client address per window; 0 disables (default: 20).
    pub rate_limit_requests: u32,

    /// Rate limit window (default: 1 minute).
    pub rate_limit_window: Duration,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.into())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env_opt(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = %name, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_backend = env_parse("STORE_BACKEND", defaults.store_backend);
        let jwt_secret = env_opt("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set - using the insecure development secret");
            defaults.jwt_secret.clone()
        });
        let blob_signing_secret = env_opt("BLOB_SIGNING_SECRET").unwrap_or_else(|| {
            tracing::warn!("BLOB_SIGNING_SECRET not set - using the insecure development secret");
            defaults.blob_signing_secret.clone()
        });

        Self {
            listen_addr: env_or("LISTEN_ADDR", &defaults.listen_addr),
            store_backend,
            database_url: env_opt("DATABASE_URL"),
            database_max_connections: env_parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            data_dir: env_or("DATA_DIR", &defaults.data_dir),
            redis_url: env_opt("REDIS_URL"),
            blob_dir: env_opt("BLOB_DIR"),
            public_base_url: env_or("PUBLIC_BASE_URL", &defaults.public_base_url),
            blob_signing_secret,
            signed_url_ttl: Duration::from_secs(env_parse(
                "SIGNED_URL_TTL_SECONDS",
                defaults.signed_url_ttl.as_secs(),
            )),
            stock_cache_ttl: Duration::from_secs(
                env_parse("STOCK_CACHE_TTL_SECONDS", defaults.stock_cache_ttl.as_secs()).max(1),
            ),
            jwt_secret,
            payment_webhook_secret: env_opt("PAYMENT_WEBHOOK_SECRET"),
            fulfillment_queue: env_or("FULFILLMENT_QUEUE", &defaults.fulfillment_queue),
            max_delivery_attempts: env_parse(
                "MAX_DELIVERY_ATTEMPTS",
                defaults.max_delivery_attempts,
            )
            .max(1),
            retry_initial_backoff: Duration::from_millis(env_parse(
                "RETRY_INITIAL_BACKOFF_MS",
                500,
            )),
            retry_max_backoff: Duration::from_millis(env_parse("RETRY_MAX_BACKOFF_MS", 30_000)),
            run_worker: env_parse("RUN_WORKER", defaults.run_worker),
            rate_limit_requests: env_parse("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            rate_limit_window: Duration::from_secs(
                env_parse(
                    "RATE_LIMIT_WINDOW_SECONDS",
                    defaults.rate_limit_window.as_secs(),
                )
                .max(1),
            ),
            cors_origins: env_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 10,
            data_dir: "/data/warticket".into(),
            redis_url: None,
            blob_dir: None,
            public_base_url: "http://localhost:8080".into(),
            blob_signing_secret: "dev-blob-signing-secret".into(),
            signed_url_ttl: Duration::from_secs(15 * 60),
            stock_cache_ttl: Duration::from_secs(60 * 60),
            jwt_secret: "dev-jwt-secret".into(),
            payment_webhook_secret: None,
            fulfillment_queue: FULFILLMENT_QUEUE.into(),
            max_delivery_attempts: 5,
            retry_initial_backoff: Duration::from_millis(500),
            retry_max_backoff: Duration::from_secs(30),
            run_worker: true,
            rate_limit_requests: 20,
            rate_limit_window: Duration::from_secs(60),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("Postgres".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert_eq!("rocksdb".parse::<StoreBackend>(), Ok(StoreBackend::Rocks));
        assert!("mysql".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.signed_url_ttl, Duration::from_secs(900));
        assert_eq!(config.stock_cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.fulfillment_queue, "ticket_generation");
        assert_eq!(config.max_delivery_attempts, 5);
        assert_eq!(config.rate_limit_requests, 20);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
    }

    #[test]
    fn zero_stock_cache_ttl_is_raised_to_one_second() {
        std::env::set_var("STOCK_CACHE_TTL_SECONDS", "0");
        let config = ServiceConfig::from_env();
        std::env::remove_var("STOCK_CACHE_TTL_SECONDS");

        assert_eq!(config.stock_cache_ttl, Duration::from_secs(1));
    }
}
