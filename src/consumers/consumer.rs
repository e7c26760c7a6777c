use crate::consumers::{
    builders::ConsumerBuilder,
    metrics::{ConsumerMetrics, MessageState},
    subscription::{Connector, SubscribeOptions, Subscription},
    Batch, ConsumerPreStartHook, Delivery, Message, Processor,
};
use futures_util::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Validated, immutable configuration of a [`Consumer`].
pub(crate) struct ConsumerConfiguration {
    pub(crate) queue_name: Arc<str>,
    /// Number of messages that triggers the hand-off of a batch to the processor.
    pub(crate) batch_count: usize,
    /// Maximum time between hand-offs. `None` disables time-based flushing.
    pub(crate) batch_timeout: Option<Duration>,
    pub(crate) retry_count: usize,
    pub(crate) retry_delay: Duration,
    pub(crate) stats_interval: Duration,
    pub(crate) requeue: bool,
    pub(crate) prefetch_count: u16,
    pub(crate) priority: Option<i32>,
    pub(crate) pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
}

/// A long-running RabbitMq consumer that accumulates deliveries into batches and hands them to
/// a [`Processor`].
///
/// # Batching
///
/// A batch is handed to the processor when it holds `batch_count` messages or when the batch
/// timeout elapses, whichever comes first. By default `batch_count` is 1 and there is no
/// timeout: every message is processed on its own.
///
/// # Fault tolerance
///
/// Failing to subscribe, or losing the subscription, is retried after a fixed delay up to the
/// configured retry count. A successful subscription restores the whole retry budget.
/// `run_until_shutdown` only fails once the budget is exhausted.
///
/// Use [`Consumer::builder`] to configure one.
pub struct Consumer {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) metrics: Arc<dyn ConsumerMetrics>,
    pub(crate) configuration: ConsumerConfiguration,
}

/// Why a consumption session ended.
enum SessionEnd {
    Shutdown,
    Failed(anyhow::Error),
}

impl Consumer {
    /// Start building a [`Consumer`] reading from `queue_name`.
    ///
    /// Subscriptions are established through `connector` - usually a
    /// [`ConnectionFactory`](crate::amqp::ConnectionFactory).
    pub fn builder<T: Into<String>>(connector: impl Connector, queue_name: T) -> ConsumerBuilder {
        ConsumerBuilder::new(Arc::new(connector), queue_name.into())
    }

    pub fn queue_name(&self) -> &str {
        &self.configuration.queue_name
    }

    /// Run the consumer until `shutdown` completes or the retry budget is exhausted.
    ///
    /// Returns `Ok(())` on shutdown, which is never treated as a failure. Returns the last
    /// connection error once every retry has been used.
    ///
    /// `shutdown` is checked before every subscription attempt, during retry delays and while
    /// waiting for deliveries. An in-flight dial is not interrupted: it is bounded by the
    /// connection timeout of the connector.
    /// Messages accumulated in a batch that was not handed to the processor are left
    /// unacknowledged: the broker redelivers them.
    #[tracing::instrument(skip_all, name = "consumer_run", fields(queue_name = %self.configuration.queue_name))]
    pub async fn run_until_shutdown(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), anyhow::Error> {
        tokio::pin!(shutdown);

        let retry_count = self.configuration.retry_count;
        let mut retries_left = retry_count;
        let mut last_error = None;

        while retries_left > 0 {
            if (&mut shutdown).now_or_never().is_some() {
                tracing::info!("consumer received shutdown event");
                return Ok(());
            }

            let error = match self.connector.subscribe(&self.subscribe_options()).await {
                Err(e) => {
                    tracing::warn!(error = ?e, retries_left, "Failed to subscribe to the queue");
                    e
                }
                Ok(mut subscription) => {
                    tracing::info!("consumer subscribed to the queue");
                    retries_left = retry_count;

                    let session_end = self.consume(&mut subscription, &mut shutdown).await;
                    if let Err(e) = subscription.close().await {
                        tracing::warn!(error = %e, "Failed to close the subscription");
                    }
                    match session_end {
                        SessionEnd::Shutdown => return Ok(()),
                        SessionEnd::Failed(e) => {
                            tracing::error!(error = ?e, "Consumer lost its subscription");
                            e
                        }
                    }
                }
            };

            last_error = Some(error);
            retries_left -= 1;
            if retries_left > 0 {
                tokio::select! {
                    biased;

                    _ = &mut shutdown => {
                        tracing::info!("consumer received shutdown event");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(self.configuration.retry_delay) => {}
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("The consumer has no retries left.")))
    }

    fn subscribe_options(&self) -> SubscribeOptions<'_> {
        SubscribeOptions {
            queue_name: &self.configuration.queue_name,
            prefetch_count: self.configuration.prefetch_count,
            priority: self.configuration.priority,
            pre_start_hooks: &self.configuration.pre_start_hooks,
        }
    }

    /// The receive loop of a single subscription.
    ///
    /// It returns when `shutdown` completes or the subscription breaks.
    async fn consume<S>(&self, subscription: &mut Subscription, shutdown: &mut S) -> SessionEnd
    where
        S: Future<Output = ()> + Unpin,
    {
        let configuration = &self.configuration;
        let mut batch = Batch::with_capacity(configuration.batch_count);
        let mut batch_timeout = configuration.batch_timeout.map(ticker);
        let mut stats = ticker(configuration.stats_interval);

        loop {
            tokio::select! {
                // Shutdown is preferred over any further processing. Timers come before
                // deliveries: a backlog keeps the delivery stream ready at all times.
                biased;

                _ = &mut *shutdown => {
                    tracing::info!(
                        pending_messages = batch.len(),
                        "consumer received shutdown event"
                    );
                    return SessionEnd::Shutdown;
                }

                _ = tick(&mut batch_timeout) => {
                    self.dispatch(&mut batch).await;
                }

                _ = stats.tick() => {
                    self.report_queue_size(subscription).await;
                }

                delivery = subscription.next_delivery() => match delivery {
                    None => {
                        return SessionEnd::Failed(anyhow::anyhow!(
                            "The broker closed the delivery stream."
                        ));
                    }
                    Some(Err(e)) => {
                        return SessionEnd::Failed(e.context("Failed to receive a delivery."));
                    }
                    Some(Ok(delivery)) => {
                        batch.push(self.receive(delivery));
                        if batch.len() >= configuration.batch_count {
                            self.dispatch(&mut batch).await;
                        }
                    }
                },
            }
        }
    }

    fn receive(&self, delivery: Delivery) -> Message {
        let queue_name = &self.configuration.queue_name;
        let message = Message::new(
            queue_name.clone(),
            delivery,
            self.configuration.requeue,
            self.metrics.clone(),
        );
        if let Some(age) = message.age() {
            self.metrics.record_message_age(queue_name, age);
        }
        self.metrics
            .record_message_state(queue_name, MessageState::Fetched, false);
        message
    }

    /// Hand the batch over to the processor, then empty it.
    async fn dispatch(&self, batch: &mut Batch) {
        if batch.is_empty() {
            return;
        }
        tracing::debug!(batch_size = batch.len(), "processing batch");
        self.processor.process(batch).await;
        batch.reset();
    }

    async fn report_queue_size(&self, subscription: &mut Subscription) {
        let queue_name = &self.configuration.queue_name;
        match subscription.queue_depth(queue_name).await {
            Ok(size) => self.metrics.record_queue_size(queue_name, size),
            Err(e) => tracing::warn!(error = ?e, "Failed to retrieve the queue size"),
        }
    }
}

/// An interval whose first tick happens one `period` from now.
fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Wait for the next tick, or forever if there is no interval.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
