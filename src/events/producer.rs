use crate::error::{AppError, Result};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Sink for outbox deliveries. The dispatcher only needs to hand a keyed
/// payload to a topic and wait for the broker acknowledgment; everything
/// else (retry, dead-letter) is the dispatcher's business.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Delivers one payload to the topic, partitioned by `key`. Returns the
    /// log offset on acknowledgment.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<i64>;
}

/// Configuration for the Kafka publisher.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
        }
    }
}

/// Kafka publisher for domain events. Partition clients are created lazily
/// per topic and cached; the partition key collapses all events of one
/// aggregate onto one partition, which preserves per-aggregate order.
pub struct KafkaEventPublisher {
    config: ProducerConfig,
    client: Arc<rskafka::client::Client>,
    partition_clients: Arc<RwLock<BTreeMap<String, Arc<PartitionClient>>>>,
}

impl KafkaEventPublisher {
    pub fn new(client: Arc<rskafka::client::Client>, config: ProducerConfig) -> Self {
        Self {
            config,
            client,
            partition_clients: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Gets or creates the partition client for the given topic.
    async fn partition_client(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        {
            let clients = self.partition_clients.read().await;
            if let Some(client) = clients.get(topic) {
                return Ok(client.clone());
            }
        }

        let partition_client = self
            .client
            .partition_client(topic.to_string(), 0, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| AppError::Internal(anyhow!("failed to get partition client: {}", e)))?;

        let client = Arc::new(partition_client);

        {
            let mut clients = self.partition_clients.write().await;
            clients.insert(topic.to_string(), client.clone());
        }

        Ok(client)
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<i64> {
        let partition_client = self.partition_client(topic).await?;

        let record = Record {
            key: Some(key.as_bytes().to_vec()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let offsets = partition_client
            .produce(vec![record], Compression::NoCompression)
            .await
            .map_err(|e| AppError::Internal(anyhow!("broker delivery failed: {}", e)))?;

        let offset = offsets.first().copied().unwrap_or(0);
        debug!("Event delivered to topic {} at offset {}", topic, offset);
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_config_default() {
        let config = ProducerConfig::default();
        assert_eq!(config.brokers, vec!["localhost:9092".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_publisher_substitutes_for_broker() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic, key, _| topic == "payments.events" && key == "agg-1")
            .returning(|_, _, _| Ok(42));

        let offset = publisher
            .publish("payments.events", "agg-1", b"{}".to_vec())
            .await
            .unwrap();
        assert_eq!(offset, 42);
    }
}
