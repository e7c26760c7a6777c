use crate::consumers::{
    consumer::{Consumer, ConsumerConfiguration},
    error::ConfigurationError,
    metrics::{ConsumerMetrics, RecorderMetrics},
    subscription::Connector,
    ConsumerPreStartHook, Processor,
};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BATCH_COUNT: usize = 1;
const DEFAULT_RETRY_COUNT: usize = 10;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PREFETCH_COUNT: u16 = 50;

/// A builder to configure a [`Consumer`] with a fluent API.
///
/// Use [`Consumer::builder`] as entrypoint.
///
/// Nothing is validated until [`ConsumerBuilder::build`] is called: an invalid configuration
/// never makes it to a running consumer.
pub struct ConsumerBuilder {
    connector: Arc<dyn Connector>,
    queue_name: String,
    processor: Option<Arc<dyn Processor>>,
    metrics: Option<Arc<dyn ConsumerMetrics>>,
    batching: Option<(usize, Duration)>,
    retry_count: usize,
    retry_delay: Duration,
    stats_interval: Duration,
    requeue: bool,
    prefetch_count: u16,
    priority: Option<i32>,
    pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
}

impl ConsumerBuilder {
    pub(crate) fn new(connector: Arc<dyn Connector>, queue_name: String) -> Self {
        Self {
            connector,
            queue_name,
            processor: None,
            metrics: None,
            batching: None,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            stats_interval: DEFAULT_STATS_INTERVAL,
            // Nacked messages go back to the queue unless told otherwise.
            requeue: true,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            priority: None,
            pre_start_hooks: Vec::new(),
        }
    }

    /// The processor that will receive every batch. Required.
    #[must_use]
    pub fn processor<P: Processor>(self, processor: P) -> Self {
        self.dyn_processor(Arc::new(processor))
    }

    /// A version of [`ConsumerBuilder::processor`] for already Arc-ed processors.
    #[must_use]
    pub fn dyn_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Hand messages to the processor in batches of `count` (at least 2), or whatever has
    /// been accumulated when `timeout` elapses, whichever comes first.
    ///
    /// If not configured, every message is processed on its own as soon as it is received.
    #[must_use]
    pub fn with_batching(mut self, count: usize, timeout: Duration) -> Self {
        self.batching = Some((count, timeout));
        self
    }

    /// How many times the consumer tries to (re)subscribe before giving up, and how long it
    /// waits between attempts.
    ///
    /// Defaults to 10 attempts, 5 seconds apart. The budget is restored after every successful
    /// subscription.
    #[must_use]
    pub fn with_retries(mut self, count: usize, delay: Duration) -> Self {
        self.retry_count = count;
        self.retry_delay = delay;
        self
    }

    /// How often the size of the queue is polled and published as a gauge.
    ///
    /// Defaults to 5 seconds.
    #[must_use]
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Whether [`Message::nack`](crate::consumers::Message::nack) asks the broker to redeliver
    /// the message (`true`, the default) or to discard/dead-letter it (`false`).
    #[must_use]
    pub fn with_requeue(mut self, requeue: bool) -> Self {
        self.requeue = requeue;
        self
    }

    /// Configure the prefetch count of the consumer.
    /// If not configured, the prefetch count is set to a default value of 50.
    ///
    /// It is raised to the batch count if lower: a batch could never fill up otherwise.
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    /// Consumer priority. See <https://www.rabbitmq.com/consumer-priority.html>.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Pre-start hooks are executed on every subscription, before deliveries are requested.
    ///
    /// Check out [`ConsumerPreStartHook`]'s documentation for more details.
    #[must_use]
    pub fn with_pre_start_hook<H: ConsumerPreStartHook>(mut self, hook: H) -> Self {
        self.pre_start_hooks.push(Arc::new(hook));
        self
    }

    /// Append multiple pre-start hooks, see [`ConsumerBuilder::with_pre_start_hook`].
    #[must_use]
    pub fn with_pre_start_hooks<I>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ConsumerPreStartHook>>,
    {
        self.pre_start_hooks.extend(hooks);
        self
    }

    /// Where consumer metrics are recorded.
    ///
    /// Defaults to [`RecorderMetrics`].
    #[must_use]
    pub fn with_metrics<M: ConsumerMetrics>(self, metrics: M) -> Self {
        self.with_dyn_metrics(Arc::new(metrics))
    }

    /// A version of [`ConsumerBuilder::with_metrics`] for already Arc-ed sinks.
    #[must_use]
    pub fn with_dyn_metrics(mut self, metrics: Arc<dyn ConsumerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and build the [`Consumer`].
    ///
    /// `build` does not connect to the broker: check out [`Consumer::run_until_shutdown`].
    pub fn build(self) -> Result<Consumer, ConfigurationError> {
        if self.queue_name.is_empty() {
            return Err(ConfigurationError::EmptyQueueName);
        }
        let processor = self.processor.ok_or(ConfigurationError::MissingProcessor)?;
        let (batch_count, batch_timeout) = match self.batching {
            None => (DEFAULT_BATCH_COUNT, None),
            Some((count, _)) if count < 2 => {
                return Err(ConfigurationError::InvalidBatchCount(count));
            }
            Some((_, timeout)) if timeout.is_zero() => {
                return Err(ConfigurationError::InvalidBatchTimeout(timeout));
            }
            Some((count, timeout)) => (count, Some(timeout)),
        };
        if self.retry_count == 0 {
            return Err(ConfigurationError::InvalidRetryCount);
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigurationError::InvalidStatsInterval(self.stats_interval));
        }
        let prefetch_count = self
            .prefetch_count
            .max(u16::try_from(batch_count).unwrap_or(u16::MAX));

        Ok(Consumer {
            connector: self.connector,
            processor,
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(RecorderMetrics::new())),
            configuration: ConsumerConfiguration {
                queue_name: self.queue_name.into(),
                batch_count,
                batch_timeout,
                retry_count: self.retry_count,
                retry_delay: self.retry_delay,
                stats_interval: self.stats_interval,
                requeue: self.requeue,
                prefetch_count,
                priority: self.priority,
                pre_start_hooks: self.pre_start_hooks,
            },
        })
    }
}
