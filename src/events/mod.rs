pub mod consumer;
pub mod handlers;
pub mod processor;
pub mod producer;
pub mod types;

pub use consumer::{ConsumerConfig, EventConsumer, HandlerRegistry};
pub use processor::{EventHandler, EventProcessor};
pub use producer::{EventPublisher, KafkaEventPublisher, ProducerConfig};
pub use types::{EventEnvelope, EventType, ParsedEnvelope, PaymentEvent};
