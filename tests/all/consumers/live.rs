//! Requires a RabbitMq broker listening on `localhost:5672`.
use crate::helpers::{ForwardingProcessor, Settle};
use carrot_batch::amqp::configuration::RabbitMqSettings;
use carrot_batch::amqp::options::BasicPublishOptions;
use carrot_batch::amqp::types::FieldTable;
use carrot_batch::amqp::{BasicProperties, ConnectionFactory};
use carrot_batch::consumers::hooks::pre_start::DeclareDurableQueue;
use carrot_batch::consumers::{Consumer, ConsumerPreStartHook};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn messages_published_to_the_broker_are_consumed_in_batches() {
    // Arrange
    let factory = ConnectionFactory::new_from_config(&RabbitMqSettings::default()).unwrap();
    let queue_name = Uuid::new_v4().to_string();
    let publisher = factory.new_connection().await.unwrap();
    let channel = publisher.create_channel().await.unwrap();
    DeclareDurableQueue
        .run(&channel, &queue_name, FieldTable::default())
        .await
        .unwrap();

    let (processor, mut batches) = ForwardingProcessor::new(Settle::Ack);
    let (stop, stopped) = oneshot::channel::<()>();
    let consumer = Consumer::builder(factory, queue_name.clone())
        .processor(processor)
        .with_batching(2, Duration::from_secs(1))
        .with_pre_start_hook(DeclareDurableQueue)
        .build()
        .unwrap();
    let handle = tokio::spawn(consumer.run_until_shutdown(async move {
        let _ = stopped.await;
    }));

    // Act
    for body in ["one", "two", "three"] {
        channel
            .basic_publish(
                "",
                &queue_name,
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default(),
            )
            .await
            .unwrap();
    }

    // Assert
    assert_eq!(vec!["one", "two"], batches.recv().await.unwrap());
    assert_eq!(vec!["three"], batches.recv().await.unwrap());
    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
