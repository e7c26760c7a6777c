use std::fmt;
use std::time::Duration;

/// Raised by [`ConsumerBuilder::build`](crate::consumers::ConsumerBuilder::build) when the
/// consumer configuration is invalid.
///
/// Configuration problems are always surfaced before the consumer starts running.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("The broker URL must not be empty.")]
    EmptyUrl,
    #[error("The broker URL `{url}` is not a valid AMQP URI: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("The queue name must not be empty.")]
    EmptyQueueName,
    #[error("A processor must be provided to build a consumer.")]
    MissingProcessor,
    #[error("The batch count must be greater than 1, got {0}.")]
    InvalidBatchCount(usize),
    #[error("The batch timeout must be greater than zero, got {0:?}.")]
    InvalidBatchTimeout(Duration),
    #[error("The retry count must be greater than zero.")]
    InvalidRetryCount,
    #[error("The stats interval must be greater than zero, got {0:?}.")]
    InvalidStatsInterval(Duration),
}

/// A collection of errors that happened while performing a multi-step operation
/// (e.g. acking every message in a [`Batch`](crate::consumers::Batch)).
///
/// Its `Display` representation is the message of each error, in order, each followed by a
/// newline.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<anyhow::Error>);

impl ErrorList {
    pub fn push(&mut self, error: anyhow::Error) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &anyhow::Error> {
        self.0.iter()
    }

    /// `Ok(())` if no error was collected, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<anyhow::Error>> for ErrorList {
    fn from(errors: Vec<anyhow::Error>) -> Self {
        Self(errors)
    }
}

impl Extend<anyhow::Error> for ErrorList {
    fn extend<I: IntoIterator<Item = anyhow::Error>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ErrorList {
    type Item = anyhow::Error;
    type IntoIter = std::vec::IntoIter<anyhow::Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.0 {
            writeln!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
