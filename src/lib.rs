// Copyright (c) 2026, The AMQP Courier Authors
// MIT License
// All rights reserved.

//! # amqp-courier
//!
//! A reliability layer over an AMQP transport. Services register
//! [`Consumer`](consumer::Consumer)s for topic bindings backed by durable
//! quorum queues, and an [`AmqpClient`](client::AmqpClient) owns the
//! connection, the single shared channel, and the publish guard. Handler
//! failures are classified into bounded-requeue and never-requeue outcomes,
//! so transient faults retry while malformed messages never loop.

pub mod binding;
pub mod channel;
pub mod client;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod handler;
pub mod transport;
