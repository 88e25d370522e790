// Copyright (c) 2026, The AMQP Courier Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! This module defines the seam between the consumer and business logic: a
//! validation predicate that runs over the decoded payload, and the handler
//! that processes it. Handlers classify their failures through
//! [`HandlerError`](crate::errors::HandlerError) so the consumer can decide
//! whether a nacked message is requeued.

use crate::errors::HandlerError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Predicate run over the decoded payload before the handler is invoked.
///
/// A `false` result discards the message without requeue and without ever
/// reaching the handler.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Business handler invoked once per validated message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes one validated payload.
    ///
    /// Returning `Ok` acknowledges the message. A `Retriable` failure may
    /// requeue it, bounded by the failure's own retry limit; a `Fatal`
    /// failure never does.
    async fn handle(&self, payload: &Value) -> Result<(), HandlerError>;
}
