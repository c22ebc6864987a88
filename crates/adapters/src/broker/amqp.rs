// SPDX-License-Identifier: MIT

//! AMQP broker adapter backed by lapin.
//!
//! One connection, one channel per [`ChannelRole`]. Queue declarations are
//! cached so a reconnect can re-declare them before resuming. Because AMQP
//! cannot attach headers to a broker-side nack, `reject` republishes the
//! message with the merged header set to its target queue (the origin queue
//! or the declared dead-letter target) and acks the original; the queue-level
//! outcome is identical to header-then-nack.

use super::{
    Broker, BrokerError, ChannelRole, Delivery, MessageHeaders, PeekedMessage, QueueOptions,
    QueueStats,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::message::Delivery as AmqpDelivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, QueueDeclareOptions, QueueDeleteOptions, QueuePurgeOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Reconnect attempts made lazily inside an operation before giving up.
const INLINE_RECONNECT_ATTEMPTS: u32 = 3;

struct Connected {
    connection: Connection,
    channels: HashMap<ChannelRole, Channel>,
}

/// lapin-backed broker adapter.
pub struct AmqpBroker {
    uri: String,
    state: tokio::sync::Mutex<Option<Connected>>,
    /// Declared queues, re-declared after a reconnect.
    declared: parking_lot::Mutex<HashMap<String, QueueOptions>>,
    /// In-flight deliveries per queue. Passive declare reports ready and
    /// consumer counts only, so unacked is tracked adapter-side.
    unacked: Arc<parking_lot::Mutex<HashMap<String, u64>>>,
}

impl AmqpBroker {
    /// Connect to the broker, retrying up to `max_retries` times with a
    /// fixed delay between attempts.
    pub async fn connect(
        uri: impl Into<String>,
        max_retries: u32,
        delay: Duration,
    ) -> Result<Self, BrokerError> {
        let uri = uri.into();
        let mut attempt = 0;
        let connection = loop {
            match Connection::connect(&uri, ConnectionProperties::default()).await {
                Ok(conn) => break conn,
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries,
                        error = %e,
                        "broker connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(BrokerError::Unavailable(e.to_string())),
            }
        };
        tracing::info!(uri = %uri, "connected to broker");
        Ok(Self {
            uri,
            state: tokio::sync::Mutex::new(Some(Connected {
                connection,
                channels: HashMap::new(),
            })),
            declared: parking_lot::Mutex::new(HashMap::new()),
            unacked: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        })
    }

    /// Get (or re-establish) the channel for a role.
    async fn channel(&self, role: ChannelRole) -> Result<Channel, BrokerError> {
        let mut state = self.state.lock().await;

        let needs_reconnect = match state.as_ref() {
            Some(c) => !c.connection.status().connected(),
            None => true,
        };
        if needs_reconnect {
            *state = Some(self.reestablish().await?);
        }
        let connected = state.as_mut().ok_or(BrokerError::Closed)?;

        if let Some(channel) = connected.channels.get(&role) {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }
        let channel = connected
            .connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        connected.channels.insert(role, channel.clone());
        Ok(channel)
    }

    /// Reconnect with bounded retries and re-declare known queues.
    async fn reestablish(&self) -> Result<Connected, BrokerError> {
        let mut attempt = 0;
        let connection = loop {
            match Connection::connect(&self.uri, ConnectionProperties::default()).await {
                Ok(conn) => break conn,
                Err(e) if attempt < INLINE_RECONNECT_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "broker reconnect failed, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(e) => return Err(BrokerError::Unavailable(e.to_string())),
            }
        };
        tracing::info!("broker connection re-established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let declared: Vec<(String, QueueOptions)> = {
            let declared = self.declared.lock();
            declared.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        for (name, opts) in declared {
            channel
                .queue_declare(&name, declare_options(&opts), declare_arguments(&opts))
                .await
                .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        }

        Ok(Connected {
            connection,
            channels: HashMap::new(),
        })
    }

    /// A short-lived channel for passive declares, which close the channel
    /// on a missing queue.
    async fn throwaway_channel(&self) -> Result<Channel, BrokerError> {
        let mut state = self.state.lock().await;
        let needs_reconnect = match state.as_ref() {
            Some(c) => !c.connection.status().connected(),
            None => true,
        };
        if needs_reconnect {
            *state = Some(self.reestablish().await?);
        }
        let connected = state.as_mut().ok_or(BrokerError::Closed)?;
        connected
            .connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))
    }

    fn bump_unacked(&self, queue: &str, delta: i64) {
        let mut unacked = self.unacked.lock();
        let entry = unacked.entry(queue.to_string()).or_insert(0);
        *entry = entry.saturating_add_signed(delta);
    }

    fn dead_letter_target(&self, queue: &str) -> Option<String> {
        self.declared
            .lock()
            .get(queue)
            .and_then(|opts| opts.dead_letter_to.clone())
    }
}

fn declare_options(opts: &QueueOptions) -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: opts.durable,
        ..QueueDeclareOptions::default()
    }
}

fn declare_arguments(opts: &QueueOptions) -> FieldTable {
    let mut arguments = FieldTable::default();
    if let Some(dlq) = &opts.dead_letter_to {
        arguments.insert(
            ShortString::from("x-dead-letter-exchange"),
            AMQPValue::LongString("".into()),
        );
        arguments.insert(
            ShortString::from("x-dead-letter-routing-key"),
            AMQPValue::LongString(dlq.as_str().into()),
        );
    }
    arguments
}

fn to_field_table(headers: &MessageHeaders) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(
            ShortString::from(key.as_str()),
            AMQPValue::LongString(value.as_str().into()),
        );
    }
    table
}

fn from_field_table(table: Option<&FieldTable>) -> MessageHeaders {
    let mut headers = MessageHeaders::new();
    if let Some(table) = table {
        for (key, value) in table.inner() {
            let value = match value {
                AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
                AMQPValue::ShortString(s) => s.to_string(),
                other => format!("{other:?}"),
            };
            headers.insert(key.to_string(), value);
        }
    }
    headers
}

fn convert_delivery(queue: &str, channel: ChannelRole, delivery: &AmqpDelivery) -> Delivery {
    let message_id = delivery
        .properties
        .message_id()
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    Delivery {
        queue: queue.to_string(),
        channel,
        message_id,
        body: delivery.data.clone(),
        headers: from_field_table(delivery.properties.headers().as_ref()),
        redelivered: delivery.redelivered,
        tag: delivery.delivery_tag,
    }
}

fn peeked_from(delivery: &AmqpDelivery) -> PeekedMessage {
    let message_id = delivery
        .properties
        .message_id()
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default();
    PeekedMessage {
        message_id,
        body: delivery.data.clone(),
        headers: from_field_table(delivery.properties.headers().as_ref()),
    }
}

async fn publish_on(
    channel: &Channel,
    queue: &str,
    body: &[u8],
    headers: &MessageHeaders,
) -> Result<(), BrokerError> {
    let properties = BasicProperties::default()
        .with_message_id(ShortString::from(uuid::Uuid::new_v4().to_string()))
        .with_headers(to_field_table(headers));
    channel
        .basic_publish("", queue, BasicPublishOptions::default(), body, properties)
        .await
        .map_err(|e| BrokerError::Protocol(e.to_string()))?
        .await
        .map_err(|e| BrokerError::Protocol(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<(), BrokerError> {
        let channel = self.channel(ChannelRole::WorkerPublish).await?;
        channel
            .queue_declare(name, declare_options(&opts), declare_arguments(&opts))
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        self.declared.lock().insert(name.to_string(), opts);
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<u64, BrokerError> {
        let channel = self.channel(ChannelRole::WorkerPublish).await?;
        let purged = channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        self.declared.lock().remove(name);
        Ok(u64::from(purged))
    }

    async fn purge_queue(&self, name: &str) -> Result<u64, BrokerError> {
        let channel = self.channel(ChannelRole::WorkerPublish).await?;
        let purged = channel
            .queue_purge(name, QueuePurgeOptions::default())
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        Ok(u64::from(purged))
    }

    async fn publish(
        &self,
        channel: ChannelRole,
        queue: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        let channel = self.channel(channel).await?;
        publish_on(&channel, queue, &body, &headers).await
    }

    async fn consume(
        &self,
        channel_role: ChannelRole,
        queue: &str,
        prefetch: u16,
    ) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        let channel = self.channel(channel_role).await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        let consumer_tag = format!("porter-{}-{}", queue, uuid::Uuid::new_v4().simple());
        let mut consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;

        let (tx, rx) = mpsc::channel(prefetch.max(1) as usize);
        let queue = queue.to_string();
        let unacked = Arc::clone(&self.unacked);
        tokio::spawn(async move {
            while let Some(result) = consumer.next().await {
                match result {
                    Ok(delivery) => {
                        let converted = convert_delivery(&queue, channel_role, &delivery);
                        {
                            let mut unacked = unacked.lock();
                            *unacked.entry(queue.clone()).or_insert(0) += 1;
                        }
                        if tx.send(converted).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(queue = %queue, error = %e, "consumer stream error");
                        break;
                    }
                }
            }
            // Receiver sees the stream end and the worker runtime rebinds.
        });
        Ok(rx)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let channel = self.channel(delivery.channel).await?;
        channel
            .basic_ack(delivery.tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        self.bump_unacked(&delivery.queue, -1);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        let channel = self.channel(delivery.channel).await?;
        channel
            .basic_nack(
                delivery.tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        self.bump_unacked(&delivery.queue, -1);
        Ok(())
    }

    async fn reject(
        &self,
        delivery: &Delivery,
        headers: MessageHeaders,
        requeue: bool,
    ) -> Result<(), BrokerError> {
        let target = if requeue {
            Some(delivery.queue.clone())
        } else {
            self.dead_letter_target(&delivery.queue)
        };

        match target {
            Some(target) => {
                let mut merged = delivery.headers.clone();
                for (key, value) in headers {
                    merged.insert(key, value);
                }
                let publish_channel = self.channel(ChannelRole::WorkerPublish).await?;
                publish_on(&publish_channel, &target, &delivery.body, &merged).await?;
                self.ack(delivery).await
            }
            None => {
                // No declared dead-letter target; fall back to a broker nack
                // and let the queue's own arguments route it.
                self.nack(delivery, requeue).await
            }
        }
    }

    async fn queue_stats(&self, name: &str) -> Result<QueueStats, BrokerError> {
        let channel = self.throwaway_channel().await?;
        let passive = QueueDeclareOptions {
            passive: true,
            ..QueueDeclareOptions::default()
        };
        let queue = channel
            .queue_declare(name, passive, FieldTable::default())
            .await
            .map_err(|_| BrokerError::QueueMissing(name.to_string()))?;
        let unacked = self.unacked.lock().get(name).copied().unwrap_or(0);
        Ok(QueueStats {
            ready: u64::from(queue.message_count()),
            unacked,
            consumers: u64::from(queue.consumer_count()),
        })
    }

    async fn peek(
        &self,
        queue: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PeekedMessage>, BrokerError> {
        let channel = self.channel(ChannelRole::WorkerPublish).await?;
        let mut fetched = Vec::new();
        let mut page = Vec::new();
        while fetched.len() < offset + limit {
            let message = channel
                .basic_get(queue, BasicGetOptions { no_ack: false })
                .await
                .map_err(|e| BrokerError::Protocol(e.to_string()))?;
            let Some(message) = message else { break };
            if fetched.len() >= offset {
                page.push(peeked_from(&message.delivery));
            }
            fetched.push(message.delivery.delivery_tag);
        }
        // Put everything back; peeking must not consume.
        for tag in fetched {
            channel
                .basic_nack(
                    tag,
                    BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    },
                )
                .await
                .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        }
        Ok(page)
    }

    async fn take_message(
        &self,
        queue: &str,
        message_id: &str,
    ) -> Result<Option<PeekedMessage>, BrokerError> {
        let channel = self.channel(ChannelRole::WorkerPublish).await?;
        let mut seen = Vec::new();
        let mut taken = None;
        loop {
            let message = channel
                .basic_get(queue, BasicGetOptions { no_ack: false })
                .await
                .map_err(|e| BrokerError::Protocol(e.to_string()))?;
            let Some(message) = message else { break };
            let peeked = peeked_from(&message.delivery);
            if peeked.message_id == message_id {
                channel
                    .basic_ack(message.delivery.delivery_tag, BasicAckOptions::default())
                    .await
                    .map_err(|e| BrokerError::Protocol(e.to_string()))?;
                taken = Some(peeked);
                break;
            }
            seen.push(message.delivery.delivery_tag);
            // Bound the scan to one pass over the queue.
            if seen.len() > 10_000 {
                break;
            }
        }
        for tag in seen {
            channel
                .basic_nack(
                    tag,
                    BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    },
                )
                .await
                .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        }
        Ok(taken)
    }
}

#[cfg(test)]
#[path = "amqp_tests.rs"]
mod tests;
