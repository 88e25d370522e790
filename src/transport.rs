// Copyright (c) 2026, The AMQP Courier Authors
// MIT License
// All rights reserved.

//! # Transport Port
//!
//! This module defines the narrow surface the crate requires from the
//! underlying AMQP transport: connect, channel creation, topology
//! declaration, consume/ack/nack, publish, and close. The traits exist so
//! the lifecycle and decision logic can be exercised against mocks; the
//! production implementation backed by lapin lives in
//! [`channel`](crate::channel).

use crate::errors::AmqpError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use lapin::{
    options::{ExchangeDeclareOptions, QueueDeclareOptions},
    types::FieldTable,
    ExchangeKind,
};
use std::sync::Arc;

/// One delivered message, snapshotted out of the transport.
///
/// The payload is opaque JSON bytes; delivery metadata travels in the header
/// table, notably `x-delivery-count`. Consumers only read deliveries, they
/// never mutate them.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: FieldTable,
}

/// Stream of deliveries for one registered consumer.
///
/// A `None` item is a transport-level cancellation signal, not a message;
/// it must be skipped without ack or nack.
pub type DeliveryStream = BoxStream<'static, Option<Delivery>>;

/// Entry point into the transport: opens connections to a broker target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, target: &str) -> Result<Arc<dyn TransportConnection>, AmqpError>;
}

/// An open connection able to create channels.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// The single shared channel all consumers and the publisher multiplex onto.
///
/// Ownership stays with the client; consumers borrow it for the duration of
/// their dispatch loop and never close it themselves.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportChannel: Send + Sync {
    async fn queue_declare(
        &self,
        queue: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), AmqpError>;

    async fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
    ) -> Result<(), AmqpError>;

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError>;

    async fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, AmqpError>;

    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    async fn basic_nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;

    /// Sends one message. Returns `false` when the transport refuses the
    /// send, which the caller must surface as a publish failure.
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<bool, AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}
