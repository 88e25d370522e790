// Copyright (c) 2026, The AMQP Courier Authors
// MIT License
// All rights reserved.

//! # Consumer Bindings
//!
//! A `ConsumerBinding` names the topology of one subscription: the queue that
//! holds messages, the exchange they are routed through, and the topic
//! pattern that selects them. Bindings are immutable once constructed and
//! nothing prevents two consumers from sharing one.

/// Immutable (queue, exchange, topic) triple describing one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerBinding {
    queue: String,
    exchange: String,
    topic: String,
}

impl ConsumerBinding {
    /// Creates a binding for the given queue, exchange, and topic pattern.
    ///
    /// The topic follows AMQP topic-exchange routing semantics, wildcards
    /// included.
    pub fn new(queue: &str, exchange: &str, topic: &str) -> ConsumerBinding {
        ConsumerBinding {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            topic: topic.to_owned(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
