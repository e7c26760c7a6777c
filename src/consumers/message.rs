use crate::amqp::convenience::BasicPropertiesExt;
use crate::consumers::metrics::{ConsumerMetrics, MessageState};
use amq_protocol_types::{DeliveryTag, ShortString};
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::BasicProperties;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::Span;
use uuid::Uuid;

/// The header carrying the correlation identifier of a message.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Name used to identify the consumer component in traces.
pub(crate) const COMPONENT: &str = "amqp-consumer";

#[async_trait::async_trait]
/// Settles a delivery with the broker.
///
/// The production implementation is [`lapin::acker::Acker`]. Test doubles can implement this
/// trait to inject broker failures.
///
/// Callers must settle a delivery at most once.
pub trait Acknowledger: Send + Sync + 'static {
    /// Positive acknowledgement - the broker removes the message from the queue.
    async fn ack(&self) -> Result<(), anyhow::Error>;

    /// Negative acknowledgement. The broker redelivers the message if `requeue` is `true`,
    /// otherwise it discards it or routes it to the dead letter exchange, if configured.
    async fn nack(&self, requeue: bool) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl Acknowledger for lapin::acker::Acker {
    async fn ack(&self) -> Result<(), anyhow::Error> {
        lapin::acker::Acker::ack(self, BasicAckOptions { multiple: false })
            .await
            .map_err(anyhow::Error::from)
    }

    async fn nack(&self, requeue: bool) -> Result<(), anyhow::Error> {
        lapin::acker::Acker::nack(
            self,
            BasicNackOptions {
                multiple: false,
                requeue,
            },
        )
        .await
        .map_err(anyhow::Error::from)
    }
}

/// A message received from the broker, before it is wrapped into a [`Message`].
pub struct Delivery {
    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message. May be an empty string
    /// if no routing key is specified.
    pub routing_key: ShortString,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,

    // Not public: only `Message` settles the delivery, and it does so at most once.
    pub(crate) acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    /// Build a delivery settled through a custom [`Acknowledger`].
    ///
    /// Exchange and routing key are left empty.
    pub fn new(
        delivery_tag: DeliveryTag,
        data: impl Into<Vec<u8>>,
        properties: BasicProperties,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            exchange: ShortString::from(""),
            routing_key: ShortString::from(""),
            redelivered: false,
            properties,
            data: data.into(),
            acker,
        }
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
            acker: Arc::new(value.acker),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("properties", &self.properties)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Processing context of a single [`Message`].
///
/// It owns the `amqp_consume` span of the message: events emitted inside
/// [`MessageContext::span`] carry queue, correlation id and component.
#[derive(Debug)]
pub struct MessageContext {
    queue_name: Arc<str>,
    correlation_id: String,
    span: Mutex<Option<Span>>,
}

impl MessageContext {
    /// The consumption span of the message, acting as its pre-populated logger.
    ///
    /// Returns a disabled span once the message has been settled.
    pub fn span(&self) -> Span {
        self.span
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(Span::none)
    }

    /// Take the span out, leaving `None` behind. Only the first call gets it.
    fn take_span(&self) -> Option<Span> {
        self.span
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_span_taken(&self) -> bool {
        self.span
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// The queue the message was consumed from.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Taken from the [`CORRELATION_ID_HEADER`] header, or generated if the producer did not
    /// set it.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// A unit of work derived from a single broker [`Delivery`].
///
/// Every message carries an open `amqp_consume` span, tagged with queue, correlation id and
/// component. The span is closed by the first call to [`Message::ack`] or [`Message::nack`].
/// Logs emitted within [`Message::span`] inherit its fields.
pub struct Message {
    context: MessageContext,
    delivery: Delivery,
    requeue: bool,
    metrics: Arc<dyn ConsumerMetrics>,
}

impl Message {
    /// Wrap a delivery received from `queue_name`.
    ///
    /// `requeue` decides what [`Message::nack`] asks the broker to do with the message.
    pub fn new(
        queue_name: Arc<str>,
        delivery: Delivery,
        requeue: bool,
        metrics: Arc<dyn ConsumerMetrics>,
    ) -> Self {
        let correlation_id = delivery
            .properties
            .get_header_str(CORRELATION_ID_HEADER)
            .filter(|id| !id.is_empty())
            .map(|id| id.into_owned())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = tracing::info_span!(
            "amqp_consume",
            queue = %queue_name,
            correlation_id = %correlation_id,
            component = COMPONENT,
            otel.kind = "consumer",
            otel.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        Self {
            context: MessageContext {
                queue_name,
                correlation_id,
                span: Mutex::new(Some(span)),
            },
            delivery,
            requeue,
            metrics,
        }
    }

    pub fn context(&self) -> &MessageContext {
        &self.context
    }

    /// The `message_id` property set by the producer, if any.
    pub fn id(&self) -> Option<&str> {
        self.delivery
            .properties
            .message_id()
            .as_ref()
            .map(ShortString::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.delivery.data
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// The consumption span of this message.
    ///
    /// Returns a disabled span once the message has been settled.
    pub fn span(&self) -> Span {
        self.context.span()
    }

    /// `true` once [`Message::ack`] or [`Message::nack`] has been called.
    pub fn is_settled(&self) -> bool {
        self.context.is_span_taken()
    }

    /// Time elapsed since the broker timestamp, if the message carries a representable one.
    pub fn age(&self) -> Option<Duration> {
        let timestamp = (*self.delivery.properties.timestamp())?;
        // Producers can put anything in there: an out-of-range timestamp has no age.
        let sent_at = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
        Some(
            SystemTime::now()
                .duration_since(sent_at)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Acknowledge the message: the broker removes it from the queue.
    ///
    /// The span is closed and the `acked` counter incremented even if the broker call fails.
    pub async fn ack(&self) -> Result<(), anyhow::Error> {
        let result = self.delivery.acker.ack().await;
        self.settle(MessageState::Acked, result.as_ref().err());
        result
    }

    /// Negatively acknowledge the message. Whether the broker redelivers it depends on the
    /// requeue policy of the consumer.
    ///
    /// The span is closed and the `nacked` counter incremented even if the broker call fails.
    pub async fn nack(&self) -> Result<(), anyhow::Error> {
        let result = self.delivery.acker.nack(self.requeue).await;
        self.settle(MessageState::Nacked, result.as_ref().err());
        result
    }

    fn settle(&self, state: MessageState, error: Option<&anyhow::Error>) {
        if let Some(span) = self.context.take_span() {
            match error {
                Some(e) => {
                    span.record("otel.status_code", "ERROR");
                    span.record("error", tracing::field::display(e));
                }
                None => {
                    span.record("otel.status_code", "OK");
                }
            }
        }
        self.metrics
            .record_message_state(self.context.queue_name(), state, error.is_some());
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("context", &self.context)
            .field("delivery", &self.delivery)
            .field("requeue", &self.requeue)
            .finish()
    }
}
