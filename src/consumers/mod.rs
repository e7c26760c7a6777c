//! Everything you need to pull messages from RabbitMq and process them in batches.
//!
//! [`Consumer`] is the place to start.
mod batch;
mod builders;
mod consumer;
mod error;
pub mod hooks;
mod message;
pub mod metrics;
mod pre_start_hook;
mod processor;
mod subscription;

pub use batch::{Batch, BatchError};
pub use builders::{ConsumerBuilder, ConsumerGroup, ConsumerGroupBuilder};
pub use consumer::Consumer;
pub use error::{ConfigurationError, ErrorList};
pub use message::{Acknowledger, Delivery, Message, MessageContext, CORRELATION_ID_HEADER};
pub use pre_start_hook::ConsumerPreStartHook;
pub use processor::Processor;
pub use subscription::{BrokerLink, Connector, DeliveryStream, SubscribeOptions, Subscription};
