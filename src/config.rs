use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub providers: ProviderConfig,
    pub webhooks: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Provider selection defaults and cache TTLs for routing state.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider attempted first when the caller gives no override.
    pub default_provider: String,
    /// Provider attempted next when the default fails transiently.
    pub fallback_provider: Option<String>,
    /// TTL for the reference -> provider session cache entries.
    pub session_ttl_secs: u64,
    /// TTL for cached provider health probes.
    pub health_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Maximum age of an embedded webhook timestamp before the delivery is
    /// rejected as a replay. Payloads without a timestamp are accepted.
    pub tolerance_secs: u64,
    /// Number of reconciliation workers consuming the queue.
    pub worker_count: usize,
    /// Bounded capacity of the reconciliation queue.
    pub queue_capacity: usize,
    /// Attempt budget per delivery before the failure is terminal.
    pub max_attempts: u32,
    /// Fixed backoff between reconciliation attempts.
    pub retry_backoff_ms: u64,
}

impl ProviderConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }
}

impl WebhookConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let redis = RedisConfig {
            url: env::var("REDIS_URL").context("REDIS_URL not set")?,
        };

        let providers = ProviderConfig {
            default_provider: env::var("PAYMENT_DEFAULT_PROVIDER")
                .context("PAYMENT_DEFAULT_PROVIDER not set")?,
            fallback_provider: env::var("PAYMENT_FALLBACK_PROVIDER")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            session_ttl_secs: env::var("PAYMENT_SESSION_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("PAYMENT_SESSION_TTL_SECS must be a valid number")?,
            health_ttl_secs: env::var("PAYMENT_HEALTH_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("PAYMENT_HEALTH_TTL_SECS must be a valid number")?,
        };

        let webhooks = WebhookConfig {
            tolerance_secs: env::var("WEBHOOK_TOLERANCE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("WEBHOOK_TOLERANCE_SECS must be a valid number")?,
            worker_count: env::var("WEBHOOK_WORKER_COUNT")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("WEBHOOK_WORKER_COUNT must be a valid number")?,
            queue_capacity: env::var("WEBHOOK_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .context("WEBHOOK_QUEUE_CAPACITY must be a valid number")?,
            max_attempts: env::var("WEBHOOK_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("WEBHOOK_MAX_ATTEMPTS must be a valid number")?,
            retry_backoff_ms: env::var("WEBHOOK_RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("WEBHOOK_RETRY_BACKOFF_MS must be a valid number")?,
        };

        let config = Config {
            server,
            database,
            redis,
            providers,
            webhooks,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.redis.url.trim().is_empty() {
            return Err(anyhow!("REDIS_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.providers.default_provider.trim().is_empty() {
            return Err(anyhow!("PAYMENT_DEFAULT_PROVIDER cannot be empty"));
        }

        if let Some(fallback) = &self.providers.fallback_provider {
            if fallback == &self.providers.default_provider {
                return Err(anyhow!(
                    "PAYMENT_FALLBACK_PROVIDER must differ from the default provider"
                ));
            }
        }

        if self.webhooks.worker_count == 0 {
            return Err(anyhow!("WEBHOOK_WORKER_COUNT must be greater than 0"));
        }

        if self.webhooks.max_attempts == 0 {
            return Err(anyhow!("WEBHOOK_MAX_ATTEMPTS must be greater than 0"));
        }

        Ok(())
    }
}
