use carrot_batch::amqp::BasicProperties;
use carrot_batch::consumers::metrics::{ConsumerMetrics, MessageState};
use carrot_batch::consumers::{
    Acknowledger, Batch, BrokerLink, Connector, Delivery, Processor, SubscribeOptions,
    Subscription,
};
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What the next call to [`ScriptedConnector::subscribe`] does.
pub enum Attempt {
    Fail,
    Succeed(mpsc::UnboundedReceiver<Delivery>),
}

/// An in-memory broker: subscriptions follow a script, then fail forever.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Attempt>>>,
    pub attempts: Arc<AtomicUsize>,
    pub link: FakeLink,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// A connector whose first subscription succeeds, fed through the returned sender.
    pub fn live() -> (Self, mpsc::UnboundedSender<Delivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new([Attempt::Succeed(receiver)]), sender)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn subscribe(
        &self,
        _options: &SubscribeOptions<'_>,
    ) -> Result<Subscription, anyhow::Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Succeed(receiver)) => {
                let deliveries = futures_util::stream::unfold(receiver, |mut receiver| async move {
                    receiver
                        .recv()
                        .await
                        .map(|d| (Ok::<_, anyhow::Error>(d), receiver))
                })
                .boxed();
                Ok(Subscription::new(self.link.clone(), deliveries))
            }
            Some(Attempt::Fail) | None => anyhow::bail!("connection refused"),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeLink {
    pub depth: Arc<AtomicUsize>,
    /// When set, queue depth queries fail.
    pub depth_unavailable: Arc<AtomicBool>,
    pub closed_channels: Arc<AtomicUsize>,
    pub closed_connections: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl BrokerLink for FakeLink {
    async fn queue_depth(&self, _queue_name: &str) -> Result<u32, anyhow::Error> {
        if self.depth_unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("queue.declare timed out")
        }
        Ok(self.depth.load(Ordering::SeqCst) as u32)
    }

    async fn close_channel(&self) -> Result<(), anyhow::Error> {
        self.closed_channels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_connection(&self) -> Result<(), anyhow::Error> {
        self.closed_connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records how each delivery was settled.
#[derive(Default)]
pub struct RecordingAcker {
    pub acks: AtomicUsize,
    pub nacks: Mutex<Vec<bool>>,
}

#[async_trait::async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self) -> Result<(), anyhow::Error> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), anyhow::Error> {
        self.nacks.lock().unwrap().push(requeue);
        Ok(())
    }
}

pub fn delivery(tag: u64, body: &str, acker: &Arc<RecordingAcker>) -> Delivery {
    Delivery::new(tag, body, BasicProperties::default(), acker.clone())
}

#[derive(Clone, Copy, Debug)]
pub enum Settle {
    Ack,
    Nack,
    Nothing,
}

/// Forwards the bodies of every batch it receives, after settling it.
pub struct ForwardingProcessor {
    settle: Settle,
    work: Option<Duration>,
    batches: mpsc::UnboundedSender<Vec<String>>,
}

impl ForwardingProcessor {
    pub fn new(settle: Settle) -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        let (batches, receiver) = mpsc::unbounded_channel();
        (
            Self {
                settle,
                work: None,
                batches,
            },
            receiver,
        )
    }

    /// Spend `work` on every batch before settling it.
    pub fn slow(settle: Settle, work: Duration) -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        let (mut processor, receiver) = Self::new(settle);
        processor.work = Some(work);
        (processor, receiver)
    }
}

#[async_trait::async_trait]
impl Processor for ForwardingProcessor {
    async fn process(&self, batch: &Batch) {
        if let Some(work) = self.work {
            tokio::time::sleep(work).await;
        }
        match self.settle {
            Settle::Ack => batch.ack().await.unwrap(),
            Settle::Nack => batch.nack().await.unwrap(),
            Settle::Nothing => {}
        }
        let bodies = batch
            .messages()
            .iter()
            .map(|m| String::from_utf8_lossy(m.body()).into_owned())
            .collect();
        let _ = self.batches.send(bodies);
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub ages: Mutex<Vec<Duration>>,
    pub states: Mutex<Vec<(MessageState, bool)>>,
    pub queue_sizes: Mutex<Vec<u32>>,
}

impl ConsumerMetrics for RecordingMetrics {
    fn record_message_age(&self, _queue_name: &str, age: Duration) {
        self.ages.lock().unwrap().push(age);
    }

    fn record_message_state(&self, _queue_name: &str, state: MessageState, has_error: bool) {
        self.states.lock().unwrap().push((state, has_error));
    }

    fn record_queue_size(&self, _queue_name: &str, size: u32) {
        self.queue_sizes.lock().unwrap().push(size);
    }
}
