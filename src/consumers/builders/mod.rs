mod consumer;
mod consumer_group;

pub use consumer::ConsumerBuilder;
pub use consumer_group::{ConsumerGroup, ConsumerGroupBuilder};
