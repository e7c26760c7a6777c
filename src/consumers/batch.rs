use crate::consumers::{error::ErrorList, Message};
use std::fmt;

/// An ordered group of [`Message`]s, handed to a [`Processor`](crate::consumers::Processor)
/// in one go.
///
/// Messages are kept in the order they were received from the broker.
/// Processors are in charge of settling every message, either one by one or via
/// [`Batch::ack`]/[`Batch::nack`]: the framework never acknowledges on their behalf.
#[derive(Debug, Default)]
pub struct Batch {
    messages: Vec<Message>,
}

/// Returned by [`Batch::ack`] and [`Batch::nack`] when at least one message could not be
/// settled.
pub struct BatchError<'b> {
    /// The messages whose broker call failed, in batch order.
    pub failed: Vec<&'b Message>,
    /// One error per failed message, in the same order as `failed`.
    pub errors: ErrorList,
}

impl Batch {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Acknowledge every message, in order.
    ///
    /// A failure does not stop the remaining messages from being acknowledged.
    pub async fn ack(&self) -> Result<(), BatchError<'_>> {
        let mut failed = Vec::new();
        let mut errors = ErrorList::default();
        for message in &self.messages {
            if let Err(e) = message.ack().await {
                failed.push(message);
                errors.push(e);
            }
        }
        BatchError::from_parts(failed, errors)
    }

    /// Negatively acknowledge every message, in order.
    ///
    /// A failure does not stop the remaining messages from being negatively acknowledged.
    pub async fn nack(&self) -> Result<(), BatchError<'_>> {
        let mut failed = Vec::new();
        let mut errors = ErrorList::default();
        for message in &self.messages {
            if let Err(e) = message.nack().await {
                failed.push(message);
                errors.push(e);
            }
        }
        BatchError::from_parts(failed, errors)
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Empty the batch, keeping its allocation around for the next round.
    pub(crate) fn reset(&mut self) {
        self.messages.clear();
    }
}

impl FromIterator<Message> for Batch {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl<'b> BatchError<'b> {
    fn from_parts(failed: Vec<&'b Message>, errors: ErrorList) -> Result<(), Self> {
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Self { failed, errors })
        }
    }
}

impl fmt::Debug for BatchError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchError")
            .field("failed", &self.failed.len())
            .field("errors", &self.errors)
            .finish()
    }
}

impl fmt::Display for BatchError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.errors, f)
    }
}

impl std::error::Error for BatchError<'_> {}
