//! Kafka implementation of the event bus ports.

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message,
    producer::{FutureProducer, FutureRecord},
    Offset, TopicPartitionList,
};
use std::time::Duration;
use tracing::{debug, error};

use crate::domain::TransactionEvent;
use crate::ports::{BusError, Delivery, EventPublisher, EventSubscriber};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str, topic: String) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| BusError::Publish(e.to_string()))?;

        Ok(Self { producer, topic })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &TransactionEvent) -> Result<(), BusError> {
        let payload = event.to_bytes()?;
        let record = FutureRecord::to(&self.topic)
            .key(event.key())
            .payload(&payload);

        match self.producer.send(record, SEND_TIMEOUT).await {
            Ok(_) => {
                debug!(
                    transaction_id = %event.transaction_id,
                    status = %event.status,
                    topic = %self.topic,
                    payload_size = payload.len(),
                    "Published event"
                );
                Ok(())
            }
            Err((err, _)) => {
                error!(
                    transaction_id = %event.transaction_id,
                    topic = %self.topic,
                    error = %err,
                    "Failed to publish event"
                );
                Err(BusError::Publish(err.to_string()))
            }
        }
    }
}

pub struct KafkaEventSubscriber {
    consumer: StreamConsumer,
    topic: String,
    last_message_offset: Option<i64>,
    last_message_partition: Option<i32>,
}

impl KafkaEventSubscriber {
    pub fn new(brokers: &str, topic: String, group_id: &str) -> Result<Self, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group_id)
            .set("bootstrap.servers", brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BusError::Receive(e.to_string()))?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| BusError::Receive(e.to_string()))?;

        Ok(Self {
            consumer,
            topic,
            last_message_offset: None,
            last_message_partition: None,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventSubscriber for KafkaEventSubscriber {
    async fn receive(&mut self) -> Result<Delivery, BusError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Receive(e.to_string()))?;

        let delivery = Delivery {
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().unwrap_or_default().to_vec(),
        };

        debug!(
            offset = message.offset(),
            partition = message.partition(),
            "Received event"
        );

        self.last_message_offset = Some(message.offset());
        self.last_message_partition = Some(message.partition());

        Ok(delivery)
    }

    async fn commit(&mut self) -> Result<(), BusError> {
        if let (Some(offset), Some(partition)) =
            (self.last_message_offset, self.last_message_partition)
        {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(&self.topic, partition, Offset::Offset(offset + 1))
                .map_err(|e| BusError::Commit(e.to_string()))?;
            self.consumer
                .commit(&tpl, CommitMode::Async)
                .map_err(|e| BusError::Commit(e.to_string()))?;
        }
        Ok(())
    }
}
