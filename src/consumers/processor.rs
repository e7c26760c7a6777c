//! The `Processor` trait is where business logic plugs into a [`Consumer`](crate::consumers::Consumer).
use crate::consumers::Batch;
use std::sync::Arc;

/// Implementers of the `Processor` trait receive the batches assembled by a
/// [`Consumer`](crate::consumers::Consumer).
///
/// # Scope
///
/// The processor owns the outcome of every message in the batch: it must settle each of them
/// with [`Message::ack`] or [`Message::nack`] (or [`Batch::ack`]/[`Batch::nack`] for the whole
/// batch). Messages left unsettled stay unacknowledged and are redelivered by the broker once
/// the subscription is closed.
///
/// # Backpressure
///
/// `process` runs inside the consumer task: no further deliveries are pulled until it
/// returns. A slow processor throttles consumption, up to the prefetch count.
///
/// [`Message::ack`]: crate::consumers::Message::ack
/// [`Message::nack`]: crate::consumers::Message::nack
#[async_trait::async_trait]
pub trait Processor: Send + Sync + 'static {
    async fn process(&self, batch: &Batch);
}

#[async_trait::async_trait]
impl<P> Processor for Box<P>
where
    P: Processor + ?Sized,
{
    async fn process(&self, batch: &Batch) {
        P::process(self, batch).await
    }
}

#[async_trait::async_trait]
impl<P> Processor for Arc<P>
where
    P: Processor + ?Sized,
{
    async fn process(&self, batch: &Batch) {
        P::process(self, batch).await
    }
}
