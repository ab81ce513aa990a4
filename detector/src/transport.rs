use edge_bridge_common::config::KafkaConfig;
use edge_bridge_common::image::ImageMessage;
use edge_bridge_common::topics::{kafka_topic, QUEUE_DEPTH};
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest image payload accepted on either topic (a 1080p bgr8 frame is ~6 MB).
const MAX_MESSAGE_BYTES: &str = "16777216";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to create Kafka client: {0}")]
    Create(KafkaError),
    #[error("failed to subscribe to {topic}: {source}")]
    Subscribe { topic: String, source: KafkaError },
    #[error("publish queue for {0} is full, image dropped")]
    QueueFull(String),
    #[error("failed to publish image to {topic}: {source}")]
    Publish { topic: String, source: KafkaError },
}

/// Outgoing side of the node.
pub trait ImagePublisher {
    fn publish(&mut self, msg: &ImageMessage) -> Result<(), TransportError>;
}

/// Publishes images to one Kafka topic with a single-slot local queue.
pub struct KafkaPublisher {
    producer: BaseProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn advertise(config: &KafkaConfig, name: &str) -> Result<Self, TransportError> {
        let producer: BaseProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.max.bytes", MAX_MESSAGE_BYTES)
            .set("linger.ms", "0")
            .set("queue.buffering.max.messages", QUEUE_DEPTH.to_string())
            .set("request.timeout.ms", "5000")
            .create()
            .map_err(TransportError::Create)?;
        let topic = kafka_topic(name);
        info!(topic, "advertising");
        Ok(Self { producer, topic })
    }
}

impl ImagePublisher for KafkaPublisher {
    fn publish(&mut self, msg: &ImageMessage) -> Result<(), TransportError> {
        let bytes = send_image(&self.producer, &self.topic, msg)?;
        debug!(seq = msg.header.seq, bytes, "image published");
        Ok(())
    }
}

/// Local producer queue that holds records until the broker acknowledges them.
trait RecordQueue {
    /// Handle pending delivery reports. Acknowledged records leave the queue.
    fn serve(&self);

    fn enqueue(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), KafkaError>;
}

impl RecordQueue for BaseProducer {
    fn serve(&self) {
        self.poll(Duration::ZERO);
    }

    fn enqueue(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), KafkaError> {
        self.send(BaseRecord::to(topic).key(key).payload(payload))
            .map_err(|(e, _)| e)
    }
}

/// Enqueue one image, returning the payload size.
///
/// Delivery reports are served first: the previous image's slot is only
/// released once its report has been handled.
fn send_image<Q: RecordQueue>(
    queue: &Q,
    topic: &str,
    msg: &ImageMessage,
) -> Result<usize, TransportError> {
    queue.serve();
    let payload = msg.serialize();
    match queue.enqueue(topic, &msg.key(), &payload) {
        Ok(()) => Ok(payload.len()),
        Err(KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull)) => {
            Err(TransportError::QueueFull(topic.to_string()))
        }
        Err(source) => Err(TransportError::Publish {
            topic: topic.to_string(),
            source,
        }),
    }
}

impl Drop for KafkaPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.producer.flush(Duration::from_secs(2)) {
            warn!(error = %e, topic = self.topic, "failed to flush pending images");
        }
    }
}

/// Incoming side of the node.
pub struct KafkaSubscriber {
    consumer: BaseConsumer,
    topic: String,
}

impl KafkaSubscriber {
    pub fn subscribe(config: &KafkaConfig, name: &str) -> Result<Self, TransportError> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("max.partition.fetch.bytes", MAX_MESSAGE_BYTES)
            .create()
            .map_err(TransportError::Create)?;

        let topic = kafka_topic(name);
        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|source| TransportError::Subscribe {
                topic: topic.clone(),
                source,
            })?;
        info!(topic, "subscribed");
        Ok(Self { consumer, topic })
    }

    /// Wait up to `timeout` for images, then return the newest payload
    /// already fetched. Older payloads are dropped.
    pub fn next_latest(&self, timeout: Duration) -> Option<Vec<u8>> {
        let first = self.consumer.poll(timeout)?;
        let drained = std::iter::once(first)
            .chain(std::iter::from_fn(|| self.consumer.poll(Duration::ZERO)))
            .filter_map(|result| match result {
                Ok(msg) => {
                    let payload = msg.payload().map(<[u8]>::to_vec);
                    if payload.is_none() {
                        debug!(offset = msg.offset(), "empty Kafka message, skipping");
                    }
                    payload
                }
                Err(e) => {
                    warn!(error = %e, topic = self.topic, "Kafka consume error");
                    None
                }
            });

        let (latest, skipped) = keep_latest(drained);
        if skipped > 0 {
            debug!(skipped, topic = self.topic, "dropped stale images");
        }
        latest
    }
}

/// Keep only the last item, counting how many came before it.
pub fn keep_latest<T>(items: impl IntoIterator<Item = T>) -> (Option<T>, usize) {
    items
        .into_iter()
        .fold((None, 0), |(prev, skipped), item| match prev {
            Some(_) => (Some(item), skipped + 1),
            None => (Some(item), skipped),
        })
}
