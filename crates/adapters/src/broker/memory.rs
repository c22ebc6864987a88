// SPDX-License-Identifier: MIT

//! In-memory broker with real queue semantics for testing
//!
//! Implements FIFO ready queues, per-consumer prefetch windows, unacked
//! tracking, and dead-letter routing per declared queue options, so retry
//! and DLQ invariants can be exercised without a live broker.
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    Broker, BrokerError, ChannelRole, Delivery, MessageHeaders, PeekedMessage, QueueOptions,
    QueueStats,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: Vec<u8>,
    headers: MessageHeaders,
    redelivered: bool,
}

struct ConsumerSlot {
    tx: mpsc::Sender<Delivery>,
    channel: ChannelRole,
    prefetch: usize,
    outstanding: usize,
}

#[derive(Default)]
struct QueueState {
    opts: QueueOptions,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, (StoredMessage, usize)>,
    consumers: Vec<ConsumerSlot>,
    next_consumer: usize,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    next_tag: u64,
}

impl BrokerState {
    fn queue_mut(&mut self, name: &str) -> Result<&mut QueueState, BrokerError> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| BrokerError::QueueMissing(name.to_string()))
    }

    /// Deliver ready messages to consumers with free prefetch capacity,
    /// round-robin across consumers.
    fn pump(&mut self, queue_name: &str) {
        let next_tag = &mut self.next_tag;
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };

        'deliver: while !queue.ready.is_empty() {
            // Drop consumers whose receiver side is gone.
            queue.consumers.retain(|c| !c.tx.is_closed());
            if queue.consumers.is_empty() {
                return;
            }

            let count = queue.consumers.len();
            for _ in 0..count {
                let idx = queue.next_consumer % queue.consumers.len();
                queue.next_consumer = queue.next_consumer.wrapping_add(1);
                if queue.consumers[idx].outstanding >= queue.consumers[idx].prefetch {
                    continue;
                }
                let Some(message) = queue.ready.pop_front() else {
                    return;
                };
                *next_tag += 1;
                let tag = *next_tag;
                let delivery = Delivery {
                    queue: queue_name.to_string(),
                    channel: queue.consumers[idx].channel,
                    message_id: message.message_id.clone(),
                    body: message.body.clone(),
                    headers: message.headers.clone(),
                    redelivered: message.redelivered,
                    tag,
                };
                match queue.consumers[idx].tx.try_send(delivery) {
                    Ok(()) => {
                        queue.consumers[idx].outstanding += 1;
                        queue.unacked.insert(tag, (message, idx));
                        continue 'deliver;
                    }
                    Err(_) => {
                        // Receiver gone or full; put the message back and
                        // retry with the next consumer.
                        queue.ready.push_front(message);
                    }
                }
            }
            // No consumer could take the message.
            return;
        }
    }

    /// Remove an unacked message, releasing its consumer's prefetch slot.
    fn settle(
        &mut self,
        queue_name: &str,
        tag: u64,
    ) -> Result<StoredMessage, BrokerError> {
        let queue = self.queue_mut(queue_name)?;
        let (message, consumer_idx) = queue
            .unacked
            .remove(&tag)
            .ok_or_else(|| BrokerError::Protocol(format!("unknown delivery tag {tag}")))?;
        if let Some(consumer) = queue.consumers.get_mut(consumer_idx) {
            consumer.outstanding = consumer.outstanding.saturating_sub(1);
        }
        Ok(message)
    }

    fn route_dead_letter(&mut self, from_queue: &str, message: StoredMessage) {
        let target = self
            .queues
            .get(from_queue)
            .and_then(|q| q.opts.dead_letter_to.clone());
        match target {
            Some(dlq) => {
                self.queues.entry(dlq.clone()).or_default().ready.push_back(message);
                self.pump(&dlq);
            }
            None => {
                tracing::warn!(
                    queue = from_queue,
                    "dropping rejected message: queue has no dead-letter target"
                );
            }
        }
    }
}

/// In-memory broker for testing
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a queue has been declared (test assertion helper).
    pub fn has_queue(&self, name: &str) -> bool {
        self.inner.lock().queues.contains_key(name)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<(), BrokerError> {
        let mut state = self.inner.lock();
        match state.queues.get_mut(name) {
            // Re-declaration keeps existing messages and consumers.
            Some(queue) => queue.opts = opts,
            None => {
                state.queues.insert(
                    name.to_string(),
                    QueueState {
                        opts,
                        ..QueueState::default()
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<u64, BrokerError> {
        let mut state = self.inner.lock();
        // Deleting an absent queue is a no-op.
        let purged = state
            .queues
            .remove(name)
            .map(|q| q.ready.len() as u64)
            .unwrap_or(0);
        Ok(purged)
    }

    async fn purge_queue(&self, name: &str) -> Result<u64, BrokerError> {
        let mut state = self.inner.lock();
        let queue = state.queue_mut(name)?;
        let purged = queue.ready.len() as u64;
        queue.ready.clear();
        Ok(purged)
    }

    async fn publish(
        &self,
        _channel: ChannelRole,
        queue: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        let mut state = self.inner.lock();
        let message = StoredMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            body,
            headers,
            redelivered: false,
        };
        state.queue_mut(queue)?.ready.push_back(message);
        state.pump(queue);
        Ok(())
    }

    async fn consume(
        &self,
        channel: ChannelRole,
        queue: &str,
        prefetch: u16,
    ) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        let prefetch = prefetch.max(1) as usize;
        let (tx, rx) = mpsc::channel(prefetch);
        let mut state = self.inner.lock();
        state.queue_mut(queue)?.consumers.push(ConsumerSlot {
            tx,
            channel,
            prefetch,
            outstanding: 0,
        });
        state.pump(queue);
        Ok(rx)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut state = self.inner.lock();
        state.settle(&delivery.queue, delivery.tag)?;
        state.pump(&delivery.queue);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.inner.lock();
        let mut message = state.settle(&delivery.queue, delivery.tag)?;
        if requeue {
            message.redelivered = true;
            state.queue_mut(&delivery.queue)?.ready.push_front(message);
        } else {
            state.route_dead_letter(&delivery.queue, message);
        }
        state.pump(&delivery.queue);
        Ok(())
    }

    async fn reject(
        &self,
        delivery: &Delivery,
        headers: MessageHeaders,
        requeue: bool,
    ) -> Result<(), BrokerError> {
        let mut state = self.inner.lock();
        let mut message = state.settle(&delivery.queue, delivery.tag)?;
        for (key, value) in headers {
            message.headers.insert(key, value);
        }
        if requeue {
            message.redelivered = true;
            state.queue_mut(&delivery.queue)?.ready.push_back(message);
        } else {
            state.route_dead_letter(&delivery.queue, message);
        }
        state.pump(&delivery.queue);
        Ok(())
    }

    async fn queue_stats(&self, name: &str) -> Result<QueueStats, BrokerError> {
        let state = self.inner.lock();
        let queue = state
            .queues
            .get(name)
            .ok_or_else(|| BrokerError::QueueMissing(name.to_string()))?;
        Ok(QueueStats {
            ready: queue.ready.len() as u64,
            unacked: queue.unacked.len() as u64,
            consumers: queue.consumers.iter().filter(|c| !c.tx.is_closed()).count() as u64,
        })
    }

    async fn peek(
        &self,
        queue: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PeekedMessage>, BrokerError> {
        let state = self.inner.lock();
        let queue = state
            .queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueMissing(queue.to_string()))?;
        Ok(queue
            .ready
            .iter()
            .skip(offset)
            .take(limit)
            .map(|m| PeekedMessage {
                message_id: m.message_id.clone(),
                body: m.body.clone(),
                headers: m.headers.clone(),
            })
            .collect())
    }

    async fn take_message(
        &self,
        queue: &str,
        message_id: &str,
    ) -> Result<Option<PeekedMessage>, BrokerError> {
        let mut state = self.inner.lock();
        let queue = state.queue_mut(queue)?;
        let position = queue.ready.iter().position(|m| m.message_id == message_id);
        Ok(position.and_then(|i| queue.ready.remove(i)).map(|m| PeekedMessage {
            message_id: m.message_id,
            body: m.body,
            headers: m.headers,
        }))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
