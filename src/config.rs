use anyhow::Result;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 4000;

// Default token lifetimes (in seconds)
const DEFAULT_ACCESS_TTL_SECS: i64 = 900; // 15 minutes
const DEFAULT_REFRESH_TTL_SECS: i64 = 604_800; // 7 days

// Time conversion constants
pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_HOUR: i64 = 3600;
pub const SECONDS_PER_DAY: i64 = 86400;

/// Heartbeat ping cadence for connected sockets
pub const HEARTBEAT_INTERVAL_SECS: u64 = 20;
/// A presence record older than this reads as offline
pub const PRESENCE_STALE_SECS: i64 = 30;
/// Typing indicator auto-clears after this many seconds
pub const TYPING_CLEAR_SECS: u64 = 3;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Kafka configuration for the message pipeline
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated list of brokers (e.g. "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Consumer group ID shared by pipeline replicas
    pub consumer_group: String,
}

/// Moderation/sentiment analyzer configuration
#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
    /// Base URL of the analyzer service (e.g. "http://analyzer:8000")
    pub base_url: String,
    /// Shared secret sent as `x-service-secret` on every call
    pub shared_secret: String,
    /// Per-call deadline in seconds
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub kafka: KafkaConfig,
    pub analyzer: AnalyzerConfig,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,
    pub cors_origins: Vec<String>,
    pub rust_log: String,
    pub db: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_access_secret = require_secret("JWT_ACCESS_SECRET")?;
        let jwt_refresh_secret = require_secret("JWT_REFRESH_SECRET")?;
        if jwt_access_secret == jwt_refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let jwt_access_ttl_secs = env_i64("JWT_ACCESS_TTL_SECS", DEFAULT_ACCESS_TTL_SECS);
        let jwt_refresh_ttl_secs = env_i64("JWT_REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL_SECS);
        if jwt_refresh_ttl_secs < jwt_access_ttl_secs {
            anyhow::bail!("JWT_REFRESH_TTL_SECS must be >= JWT_ACCESS_TTL_SECS");
        }

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            database_url: std::env::var("DATABASE_URL")?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            kafka: KafkaConfig {
                brokers: std::env::var("KAFKA_BROKER")
                    .unwrap_or_else(|_| "localhost:9092".to_string()),
                consumer_group: std::env::var("KAFKA_CONSUMER_GROUP")
                    .unwrap_or_else(|_| "parley-pipeline".to_string()),
            },
            analyzer: AnalyzerConfig {
                base_url: std::env::var("ANALYZER_URL")
                    .unwrap_or_else(|_| "http://localhost:8000".to_string()),
                shared_secret: std::env::var("SERVICE_SHARED_SECRET").unwrap_or_default(),
                timeout_secs: std::env::var("ANALYZER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            jwt_access_secret,
            jwt_refresh_secret,
            jwt_access_ttl_secs,
            jwt_refresh_ttl_secs,
            cors_origins: std::env::var("CORS_ORIGINS")
                .ok()
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            db: DbConfig {
                max_connections: std::env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
                acquire_timeout_secs: std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            },
        })
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn require_secret(name: &str) -> Result<String> {
    let secret = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} must be set", name))?;
    if secret.len() < 32 {
        anyhow::bail!(
            "{} must be at least 32 characters; generate one with: openssl rand -base64 32",
            name
        );
    }
    Ok(secret)
}
