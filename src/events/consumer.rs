use crate::error::{AppError, Result};
use crate::events::processor::{EventHandler, EventProcessor};
use crate::events::types::ParsedEnvelope;
use crate::observability::get_metrics;
use anyhow::anyhow;
use rskafka::client::partition::{PartitionClient, UnknownTopicHandling};
use rskafka::record::RecordAndOffset;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configuration for the event consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topics: Vec<String>,
    pub group_id: String,
    pub fetch_max_wait_ms: i32,
    pub max_poll_records: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topics: vec!["payments.events".to_string()],
            group_id: "payment-ledger".to_string(),
            fetch_max_wait_ms: 500,
            max_poll_records: 100,
        }
    }
}

/// Message received from the log.
#[derive(Debug, Clone)]
pub struct ConsumedMessage {
    pub topic: String,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// Routes event-type strings to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(event_type.into(), handler);
        self
    }

    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event_type)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Event consumer: reads records from the log, extracts the envelope, routes
/// by event type, and wraps every handler in the idempotent processing guard.
/// Offsets are acknowledged per message, and only after the guard returns -
/// a handler failure leaves the offset where it was so the log redelivers.
pub struct EventConsumer {
    config: ConsumerConfig,
    client: Arc<rskafka::client::Client>,
    processor: EventProcessor,
    registry: HandlerRegistry,
    partition_clients: Arc<tokio::sync::RwLock<BTreeMap<String, Arc<PartitionClient>>>>,
    offsets: Arc<tokio::sync::RwLock<BTreeMap<String, AtomicI64>>>,
    running: Arc<AtomicBool>,
}

impl EventConsumer {
    pub fn new(
        client: Arc<rskafka::client::Client>,
        processor: EventProcessor,
        registry: HandlerRegistry,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            config,
            client,
            processor,
            registry,
            partition_clients: Arc::new(tokio::sync::RwLock::new(BTreeMap::new())),
            offsets: Arc::new(tokio::sync::RwLock::new(BTreeMap::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Gets or creates a partition client for the given topic, starting from
    /// the earliest offset on first subscription.
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
        {
            let mut offsets = self.offsets.write().await;
            offsets
                .entry(topic.to_string())
                .or_insert_with(|| AtomicI64::new(0));
        }

        Ok(client)
    }

    async fn current_offset(&self, topic: &str) -> i64 {
        let offsets = self.offsets.read().await;
        offsets
            .get(topic)
            .map(|o| o.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Acknowledges a delivery by advancing the topic offset past it.
    async fn acknowledge(&self, topic: &str, offset: i64) {
        let offsets = self.offsets.read().await;
        if let Some(o) = offsets.get(topic) {
            o.store(offset + 1, Ordering::SeqCst);
        }
    }

    /// Polls one topic without acknowledging anything.
    pub async fn poll(&self, topic: &str) -> Result<Vec<ConsumedMessage>> {
        let partition_client = self.partition_client(topic).await?;
        let current_offset = self.current_offset(topic).await;

        let (records, _high_watermark) = partition_client
            .fetch_records(current_offset, 1..1_000_000, self.config.fetch_max_wait_ms)
            .await
            .map_err(|e| AppError::Internal(anyhow!("failed to fetch records: {}", e)))?;

        let messages: Vec<ConsumedMessage> = records
            .into_iter()
            .take(self.config.max_poll_records)
            .map(|r: RecordAndOffset| ConsumedMessage {
                topic: topic.to_string(),
                offset: r.offset,
                key: r.record.key,
                value: r.record.value.unwrap_or_default(),
            })
            .collect();

        debug!("Polled {} messages from topic {}", messages.len(), topic);
        Ok(messages)
    }

    /// Handles a single delivery. Returns Ok(true) if the handler ran,
    /// Ok(false) if the delivery was a duplicate or unroutable; either way
    /// the message may be acknowledged. An Err means the delivery must not
    /// be acknowledged.
    pub async fn dispatch(&self, message: &ConsumedMessage) -> Result<bool> {
        let value: serde_json::Value = match serde_json::from_slice(&message.value) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    "Discarding malformed event payload: {}", e
                );
                return Ok(false);
            }
        };

        let envelope = match ParsedEnvelope::parse(&value) {
            Some(envelope) => envelope,
            None => {
                // No event identity to dedup on; nothing to route. Dropping
                // is the only move that doesn't wedge the partition.
                warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    "Discarding unroutable event without an event id"
                );
                return Ok(false);
            }
        };

        let handler = match self.registry.get(&envelope.event_type) {
            Some(handler) => handler.clone(),
            None => {
                debug!(
                    event_type = %envelope.event_type,
                    "No handler bound for event type, skipping"
                );
                self.processor
                    .skip(&envelope, &self.config.group_id, "no handler bound")
                    .await?;
                return Ok(false);
            }
        };

        let processed = self
            .processor
            .process(&envelope, &value, &self.config.group_id, handler.as_ref())
            .await?;
        get_metrics().record_consumer_processed(
            &self.config.group_id,
            if processed { "processed" } else { "duplicate" },
        );
        Ok(processed)
    }

    /// Runs the consume loop until [`stop`](Self::stop) is called. A failed
    /// delivery stops the current topic's batch so later offsets do not jump
    /// ahead of the redelivery.
    pub async fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Starting consumer group '{}' on topics {:?}",
            self.config.group_id, self.config.topics
        );

        while self.running.load(Ordering::SeqCst) {
            for topic in self.config.topics.clone() {
                let messages = match self.poll(&topic).await {
                    Ok(messages) => messages,
                    Err(e) => {
                        warn!("Failed to poll topic {}: {}", topic, e);
                        continue;
                    }
                };

                for message in &messages {
                    match self.dispatch(message).await {
                        Ok(_) => self.acknowledge(&topic, message.offset).await,
                        Err(e) => {
                            error!(
                                topic = %topic,
                                offset = message.offset,
                                "Event processing failed, leaving delivery unacknowledged: {}", e
                            );
                            break;
                        }
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        info!("Consumer stopped");
        Ok(())
    }

    /// Stops the consume loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}
