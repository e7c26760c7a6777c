use crate::helpers::{
    delivery, Attempt, ForwardingProcessor, RecordingAcker, ScriptedConnector, Settle,
};
use carrot_batch::consumers::Consumer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[tokio::test]
async fn a_consumer_that_is_already_shut_down_never_subscribes() {
    let connector = ScriptedConnector::default();
    let (processor, _batches) = ForwardingProcessor::new(Settle::Ack);
    let consumer = Consumer::builder(connector.clone(), "orders")
        .processor(processor)
        .build()
        .unwrap();

    consumer
        .run_until_shutdown(std::future::ready(()))
        .await
        .unwrap();

    assert_eq!(0, connector.attempts());
}

#[tokio::test(start_paused = true)]
async fn a_successful_subscription_restores_the_retry_budget() {
    // Arrange
    let acker = Arc::new(RecordingAcker::default());
    let (sender, receiver) = mpsc::unbounded_channel();
    sender.send(delivery(1, "one", &acker)).unwrap();
    sender.send(delivery(2, "two", &acker)).unwrap();
    // The stream ends once both deliveries have been received.
    drop(sender);
    let connector = ScriptedConnector::new([
        Attempt::Fail,
        Attempt::Fail,
        Attempt::Fail,
        Attempt::Succeed(receiver),
    ]);
    let (processor, mut batches) = ForwardingProcessor::new(Settle::Ack);
    let consumer = Consumer::builder(connector.clone(), "orders")
        .processor(processor)
        .with_retries(5, Duration::from_millis(10))
        .build()
        .unwrap();

    // Act
    let error = consumer
        .run_until_shutdown(std::future::pending())
        .await
        .unwrap_err();

    // Assert
    // 3 failures, 1 success, then the full budget of 5 minus the lost session.
    assert_eq!(8, connector.attempts());
    assert_eq!("connection refused", error.to_string());
    assert_eq!(vec!["one"], batches.recv().await.unwrap());
    assert_eq!(vec!["two"], batches.recv().await.unwrap());
    assert_eq!(2, acker.acks.load(Ordering::SeqCst));
    assert_eq!(1, connector.link.closed_channels.load(Ordering::SeqCst));
    assert_eq!(1, connector.link.closed_connections.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn the_consumer_gives_up_once_every_retry_failed() {
    let connector = ScriptedConnector::default();
    let (processor, _batches) = ForwardingProcessor::new(Settle::Ack);
    let consumer = Consumer::builder(connector.clone(), "orders")
        .processor(processor)
        .with_retries(3, Duration::from_secs(1))
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    let outcome = consumer.run_until_shutdown(std::future::pending()).await;

    assert!(outcome.is_err());
    assert_eq!(3, connector.attempts());
    // No delay after the last attempt.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_the_retry_delay() {
    // Arrange
    let connector = ScriptedConnector::default();
    let (processor, _batches) = ForwardingProcessor::new(Settle::Ack);
    let (stop, stopped) = oneshot::channel::<()>();
    let consumer = Consumer::builder(connector.clone(), "orders")
        .processor(processor)
        .with_retries(3, Duration::from_secs(3600))
        .build()
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer.run_until_shutdown(async move {
        let _ = stopped.await;
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;
    stop.send(()).unwrap();

    // Assert
    handle.await.unwrap().unwrap();
    assert_eq!(1, connector.attempts());
}

#[tokio::test]
async fn shutdown_closes_the_live_subscription() {
    // Arrange
    let (connector, deliveries) = ScriptedConnector::live();
    let (processor, mut batches) = ForwardingProcessor::new(Settle::Ack);
    let acker = Arc::new(RecordingAcker::default());
    let (stop, stopped) = oneshot::channel::<()>();
    let consumer = Consumer::builder(connector.clone(), "orders")
        .processor(processor)
        .build()
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer.run_until_shutdown(async move {
        let _ = stopped.await;
    }));
    deliveries.send(delivery(1, "one", &acker)).unwrap();
    batches.recv().await.unwrap();
    stop.send(()).unwrap();

    // Assert
    handle.await.unwrap().unwrap();
    assert_eq!(1, connector.attempts());
    assert_eq!(1, connector.link.closed_channels.load(Ordering::SeqCst));
    assert_eq!(1, connector.link.closed_connections.load(Ordering::SeqCst));
}
