// Copyright (c) 2026, The AMQP Courier Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Reliability Layer
//!
//! This module provides the error taxonomy for every operation in the crate.
//! The `AmqpError` enum covers connection lifecycle, publishing, topology
//! declaration, and consume-time failures. The `HandlerError` enum is the
//! classification that business handlers use to tell the consumer whether a
//! failed message may be redelivered.

use thiserror::Error;

/// Represents errors that can occur during AMQP operations.
///
/// This enum covers the full lifecycle: connecting and creating the shared
/// channel, declaring topology, publishing, consuming, and shutting down.
/// Each variant carries the context needed to log it meaningfully.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Fatal startup failure while connecting or starting consumers
    #[error("failure to connect to `{target}`: {message}")]
    ConnectionError { message: String, target: String },

    /// Programmer misuse: publish was called before the client was started
    #[error("client is not initialized")]
    UninitializedError,

    /// The transport rejected or refused to buffer an outgoing message
    #[error("failure to publish to exchange `{exchange}` with topic `{topic}`")]
    PublisherError {
        exchange: String,
        topic: String,
        payload: String,
    },

    /// The outgoing payload could not be encoded as JSON
    #[error("failure to encode payload: {0}")]
    EncodePayloadError(String),

    /// Error creating or operating the shared channel
    #[error("channel failure: {0}")]
    ChannelError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare queue `{0}`")]
    DeclareQueueError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{0}` to exchange `{1}`")]
    BindQueueError(String, String),

    /// Error registering a consumer on a queue
    #[error("failure to register consumer on queue `{0}`")]
    CreateConsumerError(String),

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message: {0}")]
    NackMessageError(String),

    /// Generic consume-time failure
    #[error("failure to consume message: {0}")]
    ConsumerError(String),

    /// One or more resources could not be closed during shutdown
    #[error("failure to close transport resources: {0}")]
    CloseError(String),
}

/// Classified outcome of a failed business handler invocation.
///
/// The consumer inspects this by value to decide whether a nacked message is
/// requeued. There is no type-hierarchy dispatch: an unclassified failure is
/// expressed as `Fatal` and is never requeued.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The failure is transient; the message may be redelivered until its
    /// delivery count reaches `retry_limit`. A limit of 0 never requeues.
    #[error("retriable handler failure: {cause}")]
    Retriable {
        cause: Box<dyn std::error::Error + Send + Sync>,
        retry_limit: u32,
    },

    /// The failure is permanent; the message is never requeued.
    #[error("fatal handler failure: {cause}")]
    Fatal { cause: Box<dyn std::error::Error + Send + Sync> },
}

impl HandlerError {
    /// Wraps a cause into a bounded-requeue failure.
    pub fn retriable(
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
        retry_limit: u32,
    ) -> HandlerError {
        HandlerError::Retriable {
            cause: cause.into(),
            retry_limit,
        }
    }

    /// Wraps a cause into a never-requeue failure.
    pub fn fatal(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> HandlerError {
        HandlerError::Fatal {
            cause: cause.into(),
        }
    }
}
