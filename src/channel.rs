// Copyright (c) 2026, The AMQP Courier Authors
// MIT License
// All rights reserved.

//! # Lapin-Backed Transport
//!
//! Production implementation of the transport port on top of lapin. Errors
//! coming out of the broker are mapped into the crate's
//! [`AmqpError`](crate::errors::AmqpError) taxonomy; delivery streams are
//! adapted into the [`DeliveryStream`](crate::transport::DeliveryStream)
//! shape the consumer dispatch loop expects.

use crate::{
    errors::AmqpError,
    transport::{Delivery, DeliveryStream, Transport, TransportChannel, TransportConnection},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{FieldTable, ShortString},
    BasicProperties, Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Content type stamped on every published message
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Lapin entry point: connects to the broker target.
pub struct LapinTransport;

#[async_trait]
impl Transport for LapinTransport {
    async fn connect(&self, target: &str) -> Result<Arc<dyn TransportConnection>, AmqpError> {
        debug!("creating amqp connection...");

        let connection = Connection::connect(target, ConnectionProperties::default())
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "failure to connect");
                AmqpError::ConnectionError {
                    message: err.to_string(),
                    target: target.to_owned(),
                }
            })?;

        debug!("amqp connected");
        Ok(Arc::new(LapinConnection { connection }))
    }
}

struct LapinConnection {
    connection: Connection,
}

#[async_trait]
impl TransportConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError> {
        debug!("creating amqp channel...");

        match self.connection.create_channel().await {
            Ok(channel) => {
                debug!("channel created");
                Ok(Arc::new(LapinChannel { channel }))
            }
            Err(err) => {
                error!(error = err.to_string(), "failure to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.connection
            .close(200, "client shutdown")
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "failure to close the connection");
                AmqpError::CloseError(err.to_string())
            })
    }
}

struct LapinChannel {
    channel: lapin::Channel,
}

#[async_trait]
impl TransportChannel for LapinChannel {
    async fn queue_declare(
        &self,
        queue: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        match self.channel.queue_declare(queue, options, arguments).await {
            Ok(_) => {
                debug!(queue, "queue declared");
                Ok(())
            }
            Err(err) => {
                error!(error = err.to_string(), queue, "failure to declare queue");
                Err(AmqpError::DeclareQueueError(queue.to_owned()))
            }
        }
    }

    async fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
    ) -> Result<(), AmqpError> {
        match self
            .channel
            .exchange_declare(exchange, kind, options, FieldTable::default())
            .await
        {
            Ok(_) => {
                debug!(exchange, "exchange declared");
                Ok(())
            }
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange, "failure to declare exchange"
                );
                Err(AmqpError::DeclareExchangeError(exchange.to_owned()))
            }
        }
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        debug!(queue, exchange, routing_key, "binding queue to exchange");

        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "failure to bind queue");
                AmqpError::BindQueueError(queue.to_owned(), exchange.to_owned())
            })
    }

    async fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, AmqpError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), queue, "failure to create consumer");
                AmqpError::CreateConsumerError(queue.to_owned())
            })?;

        let stream = consumer
            .map(|result| match result {
                Ok(delivery) => {
                    let lapin::message::Delivery {
                        delivery_tag,
                        exchange,
                        routing_key,
                        properties,
                        data,
                        ..
                    } = delivery;

                    Some(Delivery {
                        delivery_tag,
                        exchange: exchange.to_string(),
                        routing_key: routing_key.to_string(),
                        headers: properties.headers().clone().unwrap_or_default(),
                        payload: data,
                    })
                }
                Err(err) => {
                    error!(error = err.to_string(), "failed delivery");
                    None
                }
            })
            .boxed();

        Ok(stream)
    }

    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|err| AmqpError::AckMessageError(err.to_string()))
    }

    async fn basic_nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|err| AmqpError::NackMessageError(err.to_string()))
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<bool, AmqpError> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                payload,
                BasicProperties::default()
                    .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
                    .with_message_id(ShortString::from(Uuid::new_v4().to_string())),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error publishing message");
                AmqpError::ChannelError(err.to_string())
            })?
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error awaiting publish confirm");
                AmqpError::ChannelError(err.to_string())
            })?;

        // Without confirms enabled the broker reports "not requested",
        // which counts as accepted.
        Ok(!confirm.is_nack())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.channel
            .close(200, "client shutdown")
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "failure to close the channel");
                AmqpError::CloseError(err.to_string())
            })
    }
}
