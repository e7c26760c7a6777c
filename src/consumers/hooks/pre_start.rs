//! A collection of pre-start hooks.
//!
//! ```
//! use carrot_batch::consumers::hooks::pre_start::{DeclareDurableQueue, WithDeadLetterQueue};
//!
//! // A durable queue whose nacked-without-requeue messages end up in `<queue>.deadletter`.
//! let pre_start_hook = WithDeadLetterQueue(DeclareDurableQueue);
//! # drop(pre_start_hook);
//! ```
use crate::consumers::ConsumerPreStartHook;
use amq_protocol_types::{AMQPValue, FieldTable};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::{Channel, ExchangeKind};

/// Declare a durable queue: it survives broker restarts.
#[derive(Clone, Copy, Debug)]
pub struct DeclareDurableQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareDurableQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: false,
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                queue_args,
            )
            .await?;
        Ok(())
    }
}

/// Declare a queue that is deleted once its last consumer goes away.
#[derive(Clone, Copy, Debug)]
pub struct DeclareAutoDeleteQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareAutoDeleteQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: false,
                    durable: false,
                    exclusive: false,
                    auto_delete: true,
                    nowait: false,
                },
                queue_args,
            )
            .await?;
        Ok(())
    }
}

/// Wraps another pre-start hook with a [dead letter exchange](https://www.rabbitmq.com/dlx.html).
///
/// It declares the durable fanout exchange `<queue_name>.deadletter`, binds it to the durable
/// queue `<queue_name>.deadletter` and marks the exchange as the dead letter exchange of the
/// queue declared by the inner hook.
/// Messages nacked while the consumer is configured not to requeue end up there.
///
/// AMQP queue arguments are immutable: switching an existing queue to
/// `WithDeadLetterQueue<_>` requires rolling a new queue.
pub struct WithDeadLetterQueue<H: ConsumerPreStartHook>(pub H);

#[async_trait::async_trait]
impl<H: ConsumerPreStartHook> ConsumerPreStartHook for WithDeadLetterQueue<H> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        let dead_letter = dead_letter_name(queue_name);

        channel
            .exchange_declare(
                &dead_letter,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    passive: false,
                    durable: true,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;
        DeclareDurableQueue
            .run(channel, &dead_letter, FieldTable::default())
            .await?;
        channel
            .queue_bind(
                &dead_letter,
                &dead_letter,
                "",
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await?;

        self.0
            .run(channel, queue_name, with_dead_letter_exchange(queue_args, dead_letter))
            .await
    }
}

fn dead_letter_name(queue_name: &str) -> String {
    format!("{queue_name}.deadletter")
}

/// `queue_args` plus the dead letter exchange; arguments set by outer hooks are kept.
fn with_dead_letter_exchange(mut queue_args: FieldTable, exchange: String) -> FieldTable {
    queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(exchange.into()),
    );
    queue_args
}
