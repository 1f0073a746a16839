use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub kafka: KafkaSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub idempotency: IdempotencySettings,
    #[serde(default)]
    pub consumer: ConsumerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
}

/// Settings for the outbox dispatcher background worker.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxSettings {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub batch_size: i64,
    pub max_retries: i32,
    /// Bound on a single broker delivery before it counts as a failure.
    pub send_timeout_ms: u64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            batch_size: 100,
            max_retries: 5,
            send_timeout_ms: 5000,
        }
    }
}

/// Settings for the idempotency cache. The TTL is clamped to the supported
/// window of 24 hours to 7 days.
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencySettings {
    pub cache_ttl_seconds: i64,
    pub key_prefix: String,
}

impl IdempotencySettings {
    pub const MIN_TTL_SECONDS: i64 = 24 * 60 * 60;
    pub const MAX_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

    pub fn effective_ttl_seconds(&self) -> i64 {
        self.cache_ttl_seconds
            .clamp(Self::MIN_TTL_SECONDS, Self::MAX_TTL_SECONDS)
    }
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: Self::MAX_TTL_SECONDS,
            key_prefix: "idempotency".to_string(),
        }
    }
}

/// Settings for the inbound event consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerSettings {
    pub enabled: bool,
    pub group_id: String,
    pub topics: Vec<String>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            group_id: "payment-ledger".to_string(),
            topics: vec!["payments.events".to_string()],
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_defaults() {
        let outbox = OutboxSettings::default();
        assert!(outbox.enabled);
        assert_eq!(outbox.poll_interval_ms, 1000);
        assert_eq!(outbox.batch_size, 100);
        assert_eq!(outbox.max_retries, 5);
    }

    #[test]
    fn test_idempotency_ttl_clamped_to_window() {
        let mut settings = IdempotencySettings::default();
        assert_eq!(settings.effective_ttl_seconds(), 7 * 24 * 60 * 60);

        settings.cache_ttl_seconds = 60;
        assert_eq!(settings.effective_ttl_seconds(), 24 * 60 * 60);

        settings.cache_ttl_seconds = 30 * 24 * 60 * 60;
        assert_eq!(settings.effective_ttl_seconds(), 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_consumer_disabled_by_default() {
        let consumer = ConsumerSettings::default();
        assert!(!consumer.enabled);
        assert_eq!(consumer.group_id, "payment-ledger");
    }
}
