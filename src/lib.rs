//! `carrot-batch` is a RabbitMQ consumer, built on top of [`lapin`], that hands messages
//! over to your code in batches.
//!
//! A [`Consumer`](crate::consumers::Consumer) subscribes to a queue, accumulates deliveries
//! until a batch is full (or a timeout elapses) and passes the batch to a
//! [`Processor`](crate::consumers::Processor), which decides whether to ack or nack each
//! message.
//! Lost connections are re-established automatically, up to a configurable number of retries.
//!
//! Several consumers can share the same lifecycle via a
//! [`ConsumerGroup`](crate::consumers::ConsumerGroup).

pub mod amqp;
pub mod consumers;
