//! Kafka publisher on top of librdkafka's buffered producer.
use std::time::Duration;

use rdkafka::{
    error::{KafkaError, RDKafkaErrorCode},
    producer::{
        BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext, PurgeConfig,
    },
    ClientConfig, ClientContext,
};
use tracing::{debug, warn};

use super::{DeliveryOutcome, DeliveryTracker, Publisher, PublisherFactory};
use crate::error::{PublisherError, SendError};

pub const DEFAULT_TOPIC: &str = "raw_flights";

/// Bound on polls spent collecting purge reports; the client's own drop
/// serves any that are still late.
const PURGE_POLLS: usize = 100;

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// bootstrap servers, `host:port[,host:port]`
    pub brokers: String,
    pub topic: String,
    pub client_id: String,
    /// max time the client buffers before a forced send
    pub linger: Duration,
    pub batch_num_messages: usize,
    /// max pending unacknowledged payloads
    pub queue_high_water_mark: usize,
    /// how long a payload may wait for acknowledgement before it fails
    pub message_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        KafkaConfig {
            brokers: "localhost:9092".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            client_id: "flights-benchmark-producer".to_string(),
            linger: Duration::from_millis(10),
            batch_num_messages: 1000,
            queue_high_water_mark: 100_000,
            message_timeout: Duration::from_secs(30),
        }
    }
}

impl KafkaConfig {
    fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("linger.ms", self.linger.as_millis().to_string())
            .set("batch.num.messages", self.batch_num_messages.to_string())
            .set(
                "queue.buffering.max.messages",
                self.queue_high_water_mark.to_string(),
            )
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            );
        cfg
    }
}

/// Routes librdkafka delivery reports into the run's tracker.
pub struct TrackingContext {
    tracker: DeliveryTracker,
}

impl ClientContext for TrackingContext {}

impl ProducerContext for TrackingContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        let outcome = match result {
            Ok(_) => DeliveryOutcome::Delivered,
            Err((err, _)) => DeliveryOutcome::Failed {
                reason: err.to_string(),
            },
        };
        self.tracker.record(outcome);
    }
}

pub struct KafkaPublisher {
    producer: BaseProducer<TrackingContext>,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig, tracker: DeliveryTracker) -> Result<Self, PublisherError> {
        let producer: BaseProducer<TrackingContext> =
            config.client_config().create_with_context(TrackingContext { tracker })?;
        debug!(brokers = %config.brokers, topic = %config.topic, "kafka producer created");
        Ok(KafkaPublisher {
            producer,
            topic: config.topic.clone(),
        })
    }
}

impl Publisher for KafkaPublisher {
    fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let record: BaseRecord<(), [u8]> = BaseRecord::to(&self.topic).payload(payload);
        match self.producer.send(record) {
            Ok(()) => Ok(()),
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                Err(SendError::QueueFull)
            }
            Err((e, _)) => Err(SendError::Rejected(e.to_string())),
        }
    }

    fn poll(&mut self, timeout: Duration) {
        self.producer.poll(timeout);
    }

    fn drain_and_close(self, timeout: Duration) {
        if let Err(e) = self.producer.flush(timeout) {
            warn!(
                "flush did not complete: {e}, purging {} unacknowledged payloads",
                self.producer.in_flight_count()
            );
            // purged payloads come back as failed delivery reports
            self.producer
                .purge(PurgeConfig::default().queue().inflight());
            for _ in 0..PURGE_POLLS {
                if self.producer.in_flight_count() == 0 {
                    break;
                }
                self.producer.poll(Duration::from_millis(10));
            }
        }
    }
}

/// Builds a fresh [`KafkaPublisher`] for every run.
#[derive(Debug, Clone, Default)]
pub struct KafkaBroker {
    config: KafkaConfig,
}

impl KafkaBroker {
    pub fn new(config: KafkaConfig) -> KafkaBroker {
        KafkaBroker { config }
    }
}

impl PublisherFactory for KafkaBroker {
    type Publisher = KafkaPublisher;

    fn create(&self, tracker: DeliveryTracker) -> Result<KafkaPublisher, PublisherError> {
        KafkaPublisher::new(&self.config, tracker)
    }
}
