// SPDX-License-Identifier: MIT

//! Message broker adapter.
//!
//! One logical broker connection with three channel roles: download and
//! upload consumers get independent prefetch windows so slow uploads never
//! stall downloads, and handler-produced follow-up jobs are published on a
//! dedicated channel so consumer flow control cannot back-pressure them.

mod amqp;

pub use amqp::AmqpBroker;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryBroker;

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Message headers carried alongside every broker message.
pub type MessageHeaders = IndexMap<String, String>;

/// Well-known message header keys.
pub mod headers {
    use super::MessageHeaders;

    /// Attempts so far; reset to 0 on operator replay.
    pub const RETRY_COUNT: &str = "x-retry-count";
    /// Operator-facing process type of the originating queue.
    pub const QUEUE_TYPE: &str = "x-queue-type";
    /// Structured failure reason (JSON).
    pub const FAILURE_REASON: &str = "x-failure-reason";
    pub const ERROR_MESSAGE: &str = "x-error-message";
    pub const ERROR_NAME: &str = "x-error-name";
    pub const ERROR_TIMESTAMP: &str = "x-error-timestamp";
    /// Transport-level details when the fault is an HTTP error.
    pub const HTTP_STATUS: &str = "x-http-status";
    pub const HTTP_CODE: &str = "x-http-code";
    pub const HTTP_URL: &str = "x-http-url";

    /// Parse the retry count header, defaulting to 0.
    pub fn retry_count(headers: &MessageHeaders) -> u32 {
        headers
            .get(RETRY_COUNT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Errors from broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("queue not declared: {0}")]
    QueueMissing(String),
    #[error("broker protocol error: {0}")]
    Protocol(String),
    #[error("broker connection closed")]
    Closed,
}

/// Logical channel a publish or consume happens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Consumers of download queues.
    Download,
    /// Consumers of upload/deletion queues.
    Upload,
    /// Publishes initiated by handlers and the planner.
    WorkerPublish,
}

/// Options for queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    /// Rejected messages are routed to this queue (dead-letter binding on
    /// the default exchange).
    pub dead_letter_to: Option<String>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            durable: true,
            dead_letter_to: None,
        }
    }
}

/// Broker-side counters for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: u64,
    pub unacked: u64,
    pub consumers: u64,
}

/// A message delivered to a consumer, with everything needed to settle it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub channel: ChannelRole,
    pub message_id: String,
    pub body: Vec<u8>,
    pub headers: MessageHeaders,
    pub redelivered: bool,
    /// Broker delivery tag; opaque outside the adapter.
    pub tag: u64,
}

/// A message observed without consuming it (DLQ inspection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeekedMessage {
    pub message_id: String,
    pub body: Vec<u8>,
    pub headers: MessageHeaders,
}

/// Durable AMQP-style broker connection.
///
/// Contract: on connection loss the adapter reconnects with bounded backoff
/// and re-declares known queues; unacked in-flight messages are redelivered
/// by the broker. `reject` is the "store failure headers, then nack" step of
/// the retry pipeline: it re-enqueues the message (requeue) or routes it to
/// the queue's dead-letter target (no requeue) with the merged header set.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a queue. Idempotent.
    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<(), BrokerError>;

    /// Delete a queue, returning the number of messages purged with it.
    async fn delete_queue(&self, name: &str) -> Result<u64, BrokerError>;

    /// Drop all ready messages from a queue, returning how many.
    async fn purge_queue(&self, name: &str) -> Result<u64, BrokerError>;

    /// Publish a message to a queue.
    async fn publish(
        &self,
        channel: ChannelRole,
        queue: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError>;

    /// Start consuming a queue with the given prefetch window. The stream
    /// ends when the queue is deleted or the adapter shuts down.
    async fn consume(
        &self,
        channel: ChannelRole,
        queue: &str,
        prefetch: u16,
    ) -> Result<mpsc::Receiver<Delivery>, BrokerError>;

    /// Acknowledge successful processing.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Negatively acknowledge without touching headers.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError>;

    /// Store failure headers on the message, then route it back to its queue
    /// (requeue) or to the queue's dead-letter target (no requeue).
    async fn reject(
        &self,
        delivery: &Delivery,
        headers: MessageHeaders,
        requeue: bool,
    ) -> Result<(), BrokerError>;

    /// Broker-side counters for a queue.
    async fn queue_stats(&self, name: &str) -> Result<QueueStats, BrokerError>;

    /// Observe ready messages without consuming them.
    async fn peek(
        &self,
        queue: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PeekedMessage>, BrokerError>;

    /// Remove and return a single ready message by ID.
    async fn take_message(
        &self,
        queue: &str,
        message_id: &str,
    ) -> Result<Option<PeekedMessage>, BrokerError>;
}
