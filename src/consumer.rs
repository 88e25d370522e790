// Copyright (c) 2026, The AMQP Courier Authors
// MIT License
// All rights reserved.

//! # Message Consumer
//!
//! A `Consumer` ties one [`ConsumerBinding`](crate::binding::ConsumerBinding)
//! to a validation predicate and a business handler. Starting it declares the
//! binding's topology (durable quorum queue, durable topic exchange, topic
//! binding) and spawns a dispatch task over the delivery stream.
//!
//! Every delivery resolves to exactly one of ack, nack-with-requeue, or
//! nack-without-requeue; failures never escalate out of the dispatch loop.
//! Requeueing is bounded per failure site: a `Retriable` handler error is
//! requeued only while the message's `x-delivery-count` header stays below
//! that error's own retry limit.

use crate::{
    binding::ConsumerBinding,
    errors::{AmqpError, HandlerError},
    handler::{MessageHandler, Validator},
    transport::{Delivery, DeliveryStream, TransportChannel},
};
use futures_util::StreamExt;
use lapin::{
    options::{ExchangeDeclareOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    ExchangeKind,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Header carrying the broker-side redelivery count
pub const AMQP_HEADERS_X_DELIVERY_COUNT: &str = "x-delivery-count";
/// Queue argument selecting the queue type
pub const AMQP_HEADERS_QUEUE_TYPE: &str = "x-queue-type";
/// Replicated queue type tolerant of broker node failure
pub const QUORUM_QUEUE_TYPE: &str = "quorum";

/// One subscription: a binding, a payload validator, and a business handler.
pub struct Consumer {
    binding: ConsumerBinding,
    validator: Validator,
    handler: Arc<dyn MessageHandler>,
}

impl Consumer {
    /// Creates a consumer for the given binding.
    ///
    /// # Parameters
    /// * `binding` - queue/exchange/topic triple to subscribe to
    /// * `validator` - predicate run over the decoded payload
    /// * `handler` - business handler invoked for validated payloads
    pub fn new(
        binding: ConsumerBinding,
        validator: Validator,
        handler: Arc<dyn MessageHandler>,
    ) -> Consumer {
        Consumer {
            binding,
            validator,
            handler,
        }
    }

    pub fn binding(&self) -> &ConsumerBinding {
        &self.binding
    }

    /// Declares the binding's topology and starts consuming.
    ///
    /// Declarations run in order: queue (durable, quorum), exchange (topic,
    /// durable), binding. The dispatch loop then runs as a spawned task until
    /// the delivery stream ends; the channel is only borrowed and is never
    /// closed here.
    pub async fn start(&self, channel: Arc<dyn TransportChannel>) -> Result<(), AmqpError> {
        self.declare_topology(channel.as_ref()).await?;

        let consumer_tag = format!("{}-{}", self.binding.queue(), Uuid::new_v4());
        let deliveries = channel
            .basic_consume(self.binding.queue(), &consumer_tag)
            .await?;

        debug!(
            queue = self.binding.queue(),
            exchange = self.binding.exchange(),
            "consuming"
        );

        let worker = DeliveryWorker {
            binding: self.binding.clone(),
            validator: self.validator.clone(),
            handler: self.handler.clone(),
        };
        tokio::spawn(async move { worker.run(channel, deliveries).await });

        Ok(())
    }

    async fn declare_topology(&self, channel: &dyn TransportChannel) -> Result<(), AmqpError> {
        let mut arguments = FieldTable::default();
        arguments.insert(
            ShortString::from(AMQP_HEADERS_QUEUE_TYPE),
            AMQPValue::LongString(LongString::from(QUORUM_QUEUE_TYPE)),
        );

        channel
            .queue_declare(
                self.binding.queue(),
                QueueDeclareOptions {
                    passive: false,
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                arguments,
            )
            .await?;

        channel
            .exchange_declare(
                self.binding.exchange(),
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    passive: false,
                    durable: true,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
            )
            .await?;

        channel
            .queue_bind(
                self.binding.queue(),
                self.binding.exchange(),
                self.binding.topic(),
            )
            .await
    }
}

/// Dispatch task state for one binding.
struct DeliveryWorker {
    binding: ConsumerBinding,
    validator: Validator,
    handler: Arc<dyn MessageHandler>,
}

impl DeliveryWorker {
    /// Runs the dispatch loop until the delivery stream ends.
    ///
    /// Per-delivery failures are logged and recovered here; nothing escalates
    /// past this loop.
    async fn run(self, channel: Arc<dyn TransportChannel>, mut deliveries: DeliveryStream) {
        while let Some(item) = deliveries.next().await {
            // A `None` item is a cancellation signal: no handler, no ack/nack.
            let Some(delivery) = item else {
                debug!(queue = self.binding.queue(), "cancellation signal");
                continue;
            };

            if let Err(err) = self.dispatch(channel.as_ref(), delivery).await {
                error!(
                    error = err.to_string(),
                    queue = self.binding.queue(),
                    "error consuming message"
                );
            }
        }

        debug!(queue = self.binding.queue(), "delivery stream closed");
    }

    /// Decides ack vs nack for one delivery.
    async fn dispatch(
        &self,
        channel: &dyn TransportChannel,
        delivery: Delivery,
    ) -> Result<(), AmqpError> {
        let payload: Value = match serde_json::from_slice(&delivery.payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    error = err.to_string(),
                    queue = self.binding.queue(),
                    "discarding undecodable payload"
                );
                return channel.basic_nack(delivery.delivery_tag, false).await;
            }
        };

        if !(self.validator)(&payload) {
            warn!(queue = self.binding.queue(), "discarding invalid payload");
            return channel.basic_nack(delivery.delivery_tag, false).await;
        }

        match self.handler.handle(&payload).await {
            Ok(()) => {
                debug!(queue = self.binding.queue(), "message processed");
                channel.basic_ack(delivery.delivery_tag).await
            }
            Err(HandlerError::Retriable { cause, retry_limit }) => {
                let count = delivery_count(&delivery.headers);
                let requeue = count < retry_limit;
                warn!(
                    error = cause.to_string(),
                    queue = self.binding.queue(),
                    delivery_count = count,
                    retry_limit,
                    requeue,
                    "retriable handler failure"
                );
                channel.basic_nack(delivery.delivery_tag, requeue).await
            }
            Err(HandlerError::Fatal { cause }) => {
                error!(
                    error = cause.to_string(),
                    queue = self.binding.queue(),
                    "fatal handler failure"
                );
                channel.basic_nack(delivery.delivery_tag, false).await
            }
        }
    }
}

/// Extracts the redelivery count from the `x-delivery-count` header.
///
/// The broker may carry it as an integer or a numeric string. Absent,
/// unparsable, or negative values all read as 0.
fn delivery_count(headers: &FieldTable) -> u32 {
    match headers.inner().get(AMQP_HEADERS_X_DELIVERY_COUNT) {
        Some(AMQPValue::LongLongInt(count)) => u32::try_from(*count).unwrap_or(0),
        Some(AMQPValue::LongInt(count)) => u32::try_from(*count).unwrap_or(0),
        Some(AMQPValue::LongUInt(count)) => *count,
        Some(AMQPValue::ShortInt(count)) => u32::try_from(*count).unwrap_or(0),
        Some(AMQPValue::ShortUInt(count)) => u32::from(*count),
        Some(AMQPValue::LongString(count)) => std::str::from_utf8(count.as_bytes())
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockMessageHandler;
    use crate::transport::MockTransportChannel;
    use futures_util::stream;
    use lapin::types::LongLongInt;
    use mockall::predicate::eq;
    use std::io;

    fn worker(validator: Validator, handler: MockMessageHandler) -> DeliveryWorker {
        DeliveryWorker {
            binding: ConsumerBinding::new("orders.queue", "orders.exchange", "orders.created"),
            validator,
            handler: Arc::new(handler),
        }
    }

    fn accept_all() -> Validator {
        Arc::new(|_| true)
    }

    fn delivery(headers: FieldTable) -> Delivery {
        Delivery {
            delivery_tag: 7,
            exchange: "orders.exchange".to_owned(),
            routing_key: "orders.created".to_owned(),
            payload: br#"{"id":"1"}"#.to_vec(),
            headers,
        }
    }

    fn delivery_count_header(value: AMQPValue) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(ShortString::from(AMQP_HEADERS_X_DELIVERY_COUNT), value);
        headers
    }

    fn stream_of(deliveries: Vec<Option<Delivery>>) -> DeliveryStream {
        stream::iter(deliveries).boxed()
    }

    #[tokio::test]
    async fn declares_topology_and_registers_consumer() {
        let mut channel = MockTransportChannel::new();
        channel
            .expect_queue_declare()
            .withf(|queue, options, arguments| {
                queue == "orders.queue"
                    && options.durable
                    && matches!(
                        arguments.inner().get(AMQP_HEADERS_QUEUE_TYPE),
                        Some(AMQPValue::LongString(kind)) if kind.as_bytes() == b"quorum"
                    )
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        channel
            .expect_exchange_declare()
            .withf(|exchange, kind, options| {
                exchange == "orders.exchange" && *kind == ExchangeKind::Topic && options.durable
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        channel
            .expect_queue_bind()
            .with(eq("orders.queue"), eq("orders.exchange"), eq("orders.created"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        channel
            .expect_basic_consume()
            .withf(|queue, tag| queue == "orders.queue" && tag.starts_with("orders.queue-"))
            .times(1)
            .returning(|_, _| Ok(stream::empty().boxed()));

        let consumer = Consumer::new(
            ConsumerBinding::new("orders.queue", "orders.exchange", "orders.created"),
            accept_all(),
            Arc::new(MockMessageHandler::new()),
        );

        consumer
            .start(Arc::new(channel))
            .await
            .expect("start succeeds");
    }

    #[tokio::test]
    async fn acks_when_handler_succeeds() {
        let mut handler = MockMessageHandler::new();
        handler.expect_handle().times(1).returning(|_| Ok(()));

        let mut channel = MockTransportChannel::new();
        channel
            .expect_basic_ack()
            .with(eq(7u64))
            .times(1)
            .returning(|_| Ok(()));

        let worker = worker(accept_all(), handler);
        worker
            .run(
                Arc::new(channel),
                stream_of(vec![Some(delivery(FieldTable::default()))]),
            )
            .await;
    }

    #[tokio::test]
    async fn requeues_retriable_failure_below_retry_limit() {
        let mut handler = MockMessageHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(HandlerError::retriable(io::Error::other("transient"), 3)));

        let mut channel = MockTransportChannel::new();
        channel
            .expect_basic_nack()
            .with(eq(7u64), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));

        // No x-delivery-count header reads as 0, and 0 < 3.
        let worker = worker(accept_all(), handler);
        worker
            .run(
                Arc::new(channel),
                stream_of(vec![Some(delivery(FieldTable::default()))]),
            )
            .await;
    }

    #[tokio::test]
    async fn does_not_requeue_retriable_failure_at_retry_limit() {
        let mut handler = MockMessageHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(HandlerError::retriable(io::Error::other("transient"), 2)));

        let mut channel = MockTransportChannel::new();
        channel
            .expect_basic_nack()
            .with(eq(7u64), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        // Numeric-string header "2" is not below limit 2.
        let headers =
            delivery_count_header(AMQPValue::LongString(LongString::from("2")));
        let worker = worker(accept_all(), handler);
        worker
            .run(Arc::new(channel), stream_of(vec![Some(delivery(headers))]))
            .await;
    }

    #[tokio::test]
    async fn never_requeues_fatal_failure() {
        let mut handler = MockMessageHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(HandlerError::fatal(io::Error::other("broken"))));

        let mut channel = MockTransportChannel::new();
        channel
            .expect_basic_nack()
            .with(eq(7u64), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        // Delivery count is irrelevant for fatal failures.
        let headers = delivery_count_header(AMQPValue::LongLongInt(LongLongInt::from(0i64)));
        let worker = worker(accept_all(), handler);
        worker
            .run(Arc::new(channel), stream_of(vec![Some(delivery(headers))]))
            .await;
    }

    #[tokio::test]
    async fn skips_cancellation_signal_without_ack_or_nack() {
        // Handler and channel expect no calls at all.
        let worker = worker(accept_all(), MockMessageHandler::new());
        worker
            .run(Arc::new(MockTransportChannel::new()), stream_of(vec![None]))
            .await;
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_handler() {
        let mut channel = MockTransportChannel::new();
        channel
            .expect_basic_nack()
            .with(eq(7u64), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        let reject_all: Validator = Arc::new(|_| false);
        let worker = worker(reject_all, MockMessageHandler::new());
        worker
            .run(
                Arc::new(channel),
                stream_of(vec![Some(delivery(FieldTable::default()))]),
            )
            .await;
    }

    #[tokio::test]
    async fn undecodable_payload_is_nacked_without_requeue() {
        let mut channel = MockTransportChannel::new();
        channel
            .expect_basic_nack()
            .with(eq(7u64), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut broken = delivery(FieldTable::default());
        broken.payload = b"not-json".to_vec();

        let worker = worker(accept_all(), MockMessageHandler::new());
        worker
            .run(Arc::new(channel), stream_of(vec![Some(broken)]))
            .await;
    }

    #[test]
    fn delivery_count_parses_integers_and_numeric_strings() {
        assert_eq!(delivery_count(&FieldTable::default()), 0);
        assert_eq!(
            delivery_count(&delivery_count_header(AMQPValue::LongLongInt(
                LongLongInt::from(5i64)
            ))),
            5
        );
        assert_eq!(
            delivery_count(&delivery_count_header(AMQPValue::LongString(
                LongString::from("2")
            ))),
            2
        );
    }

    #[test]
    fn delivery_count_defaults_to_zero_for_garbage() {
        assert_eq!(
            delivery_count(&delivery_count_header(AMQPValue::LongString(
                LongString::from("not-a-number")
            ))),
            0
        );
        assert_eq!(
            delivery_count(&delivery_count_header(AMQPValue::LongLongInt(
                LongLongInt::from(-3i64)
            ))),
            0
        );
        assert_eq!(
            delivery_count(&delivery_count_header(AMQPValue::Boolean(true))),
            0
        );
    }
}
