//! The metric series emitted by a [`Consumer`](crate::consumers::Consumer).
use std::fmt;
use std::sync::Once;
use std::time::Duration;

pub const MESSAGE_AGE: &str = "amqp_message_age";
pub const MESSAGE_STATE: &str = "amqp_message_state";
pub const QUEUE_SIZE: &str = "amqp_queue_size";

static DESCRIBE: Once = Once::new();

/// The stage of its lifecycle a message has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageState {
    /// The message has been received from the broker.
    Fetched,
    /// The message has been acknowledged.
    Acked,
    /// The message has been negatively acknowledged.
    Nacked,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Acked => "acked",
            Self::Nacked => "nacked",
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for the metrics produced while consuming messages.
///
/// The consumer receives its sink at construction time instead of reaching for a global
/// registry: tests can inject an in-memory implementation to assert on what was recorded.
/// [`RecorderMetrics`] is the production implementation.
///
/// Implementations must tolerate concurrent calls.
pub trait ConsumerMetrics: Send + Sync + 'static {
    /// Time elapsed between the broker timestamp of a message and its receipt.
    fn record_message_age(&self, queue_name: &str, age: Duration);

    /// A message reached `state`. `has_error` is set when the broker call behind the
    /// transition failed.
    fn record_message_state(&self, queue_name: &str, state: MessageState, has_error: bool);

    /// Number of messages waiting in the queue, as reported by the broker.
    fn record_queue_size(&self, queue_name: &str, size: u32);
}

/// [`ConsumerMetrics`] backed by the [`metrics`] facade.
///
/// Series are described once per process, the first time a `RecorderMetrics` is created.
/// Values end up in whatever recorder (e.g. a Prometheus exporter) the application installed.
#[derive(Debug, Clone, Copy)]
pub struct RecorderMetrics(());

impl RecorderMetrics {
    pub fn new() -> Self {
        DESCRIBE.call_once(|| {
            metrics::describe_gauge!(
                MESSAGE_AGE,
                metrics::Unit::Seconds,
                "Age of a message, from broker timestamp to receipt."
            );
            metrics::describe_counter!(
                MESSAGE_STATE,
                metrics::Unit::Count,
                "Number of messages by queue and state."
            );
            metrics::describe_gauge!(
                QUEUE_SIZE,
                metrics::Unit::Count,
                "Number of messages waiting in the queue."
            );
        });
        Self(())
    }
}

impl Default for RecorderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerMetrics for RecorderMetrics {
    fn record_message_age(&self, queue_name: &str, age: Duration) {
        metrics::gauge!(MESSAGE_AGE, "queue" => queue_name.to_owned()).set(age.as_secs_f64());
    }

    fn record_message_state(&self, queue_name: &str, state: MessageState, has_error: bool) {
        metrics::counter!(
            MESSAGE_STATE,
            "queue" => queue_name.to_owned(),
            "state" => state.as_str(),
            "has_error" => has_error.to_string()
        )
        .increment(1);
    }

    fn record_queue_size(&self, queue_name: &str, size: u32) {
        metrics::gauge!(QUEUE_SIZE, "queue" => queue_name.to_owned()).set(f64::from(size));
    }
}
