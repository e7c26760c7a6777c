use crate::consumers::{error::ErrorList, ConsumerPreStartHook, Delivery};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;

/// The stream of deliveries pushed by the broker for a subscription.
///
/// It yields `None` when the broker closes the underlying channel.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, anyhow::Error>>;

#[async_trait::async_trait]
/// The broker-side resources held by a [`Subscription`]: a channel and the connection it
/// was opened on.
pub trait BrokerLink: Send + Sync + 'static {
    /// Number of messages currently waiting in `queue_name`.
    async fn queue_depth(&self, queue_name: &str) -> Result<u32, anyhow::Error>;

    async fn close_channel(&self) -> Result<(), anyhow::Error>;

    async fn close_connection(&self) -> Result<(), anyhow::Error>;
}

/// What a [`Connector`] needs to know to start consuming from a queue.
pub struct SubscribeOptions<'a> {
    pub queue_name: &'a str,
    /// Maximum number of unacknowledged deliveries the broker pushes to the consumer.
    pub prefetch_count: u16,
    /// Consumer priority. See <https://www.rabbitmq.com/consumer-priority.html>.
    pub priority: Option<i32>,
    /// Executed against the freshly-opened channel, before consuming starts.
    pub pre_start_hooks: &'a [Arc<dyn ConsumerPreStartHook>],
}

#[async_trait::async_trait]
/// Establishes [`Subscription`]s with a broker.
///
/// [`ConnectionFactory`](crate::amqp::ConnectionFactory) is the RabbitMq implementation.
///
/// Implementors must not leak resources on failure: if a step of the handshake fails, whatever
/// was already opened must be closed before returning the error.
pub trait Connector: Send + Sync + 'static {
    async fn subscribe(&self, options: &SubscribeOptions<'_>) -> Result<Subscription, anyhow::Error>;
}

#[async_trait::async_trait]
impl<C: Connector + ?Sized> Connector for Arc<C> {
    async fn subscribe(&self, options: &SubscribeOptions<'_>) -> Result<Subscription, anyhow::Error> {
        C::subscribe(self, options).await
    }
}

/// A live consumption session: a broker link plus the deliveries flowing through it.
///
/// A subscription is owned by a single consumer task and is never shared.
pub struct Subscription {
    link: Box<dyn BrokerLink>,
    deliveries: DeliveryStream,
    closed: bool,
}

impl Subscription {
    pub fn new(link: impl BrokerLink, deliveries: DeliveryStream) -> Self {
        Self {
            link: Box::new(link),
            deliveries,
            closed: false,
        }
    }

    /// Wait for the next delivery.
    ///
    /// Cancel safe: dropping the returned future does not lose deliveries.
    pub(crate) async fn next_delivery(&mut self) -> Option<Result<Delivery, anyhow::Error>> {
        self.deliveries.next().await
    }

    // `&mut self` keeps the future `Send`: the delivery stream is not `Sync`.
    pub(crate) async fn queue_depth(&mut self, queue_name: &str) -> Result<u32, anyhow::Error> {
        self.link.queue_depth(queue_name).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the channel, then the connection.
    ///
    /// Both are attempted even if closing the channel fails; all failures are returned together.
    /// Calling `close` on an already closed subscription does nothing.
    pub async fn close(&mut self) -> Result<(), ErrorList> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errors = ErrorList::default();
        if let Err(e) = self.link.close_channel().await {
            errors.push(e.context("Failed to close the channel."));
        }
        if let Err(e) = self.link.close_connection().await {
            errors.push(e.context("Failed to close the connection."));
        }
        errors.into_result()
    }
}
