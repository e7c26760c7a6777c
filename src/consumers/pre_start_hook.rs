use amq_protocol_types::FieldTable;
use lapin::Channel;

#[async_trait::async_trait]
/// A hook to execute logic against the broker before a [`Consumer`] starts consuming.
///
/// # Use case
///
/// Who creates the queue a consumer reads from? What about its dead letter exchange?
///
/// Depending on your setup, this might be done via Terraform or manually.
/// Often, though, it is preferable to have consumers in charge of creating the objects they
/// rely on.
///
/// Pre-start hooks run on every (re)subscription, right after the channel has been opened and
/// before deliveries are requested. A failing hook fails the subscription attempt, which
/// is then retried like any other connection error.
///
/// # Queue arguments
///
/// The consumer always passes an empty `queue_args`. Wrapping hooks add to it before delegating:
/// [`WithDeadLetterQueue`] inserts `x-dead-letter-exchange`, so the hook that finally declares
/// the queue must forward `queue_args` to `queue_declare` untouched.
///
/// Ready-made hooks live in [`hooks::pre_start`].
///
/// [`Consumer`]: crate::consumers::Consumer
/// [`hooks::pre_start`]: crate::consumers::hooks::pre_start
/// [`WithDeadLetterQueue`]: crate::consumers::hooks::pre_start::WithDeadLetterQueue
pub trait ConsumerPreStartHook: Send + Sync + 'static {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error>;
}

/// assert it's object safe
type _CHECK = Box<dyn ConsumerPreStartHook>;
