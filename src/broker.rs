//! Per-client message queues with single-consumer delivery.
//!
//! Each client id owns one queue. Messages published while the consumer is
//! detached stay buffered; a queue whose consumer goes away is reclaimed
//! after a grace period unless the client rebinds first. Delivery is
//! at-least-once: a payload whose handler fails is requeued at the tail.

pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Handles one payload taken off a client's queue.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    async fn handle(&self, client_id: &str, payload: String) -> CoreResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerTag(String);

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Appends a payload to the client's queue. The queue must exist, i.e.
    /// the client bound at some point and its grace period has not lapsed.
    async fn publish(&self, client_id: &str, payload: String) -> CoreResult<()>;

    /// Attaches the single consumer for a client's queue, creating the
    /// queue if needed. Fails if a consumer is already attached.
    async fn bind(
        &self,
        client_id: &str,
        consumer: Arc<dyn QueueConsumer>,
    ) -> CoreResult<ConsumerTag>;

    /// Detaches the consumer and starts the reclamation clock.
    async fn unbind(&self, client_id: &str, tag: &ConsumerTag) -> CoreResult<()>;
}

struct ActiveConsumer {
    tag: ConsumerTag,
    cancel: CancellationToken,
}

struct QueueEntry {
    tx: mpsc::UnboundedSender<String>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    consumer: Option<ActiveConsumer>,
    // Bumped on every unbind; a reclaim timer only fires while it is
    // still the latest one, so a rebind-then-unbind restarts the clock.
    reclaim_epoch: u64,
}

impl QueueEntry {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            consumer: None,
            reclaim_epoch: 0,
        }
    }
}

/// In-process broker over unbounded mpsc channels.
pub struct ChannelBroker {
    queues: Arc<Mutex<HashMap<String, QueueEntry>>>,
    grace: Duration,
}

impl ChannelBroker {
    pub fn new(grace: Duration) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            grace,
        }
    }
}

#[async_trait]
impl MessageBroker for ChannelBroker {
    async fn publish(&self, client_id: &str, payload: String) -> CoreResult<()> {
        let queues = self.queues.lock().await;
        let entry = queues
            .get(client_id)
            .ok_or_else(|| CoreError::Broker(format!("no queue for client {client_id}")))?;
        entry
            .tx
            .send(payload)
            .map_err(|_| CoreError::Broker(format!("queue for client {client_id} is closed")))
    }

    async fn bind(
        &self,
        client_id: &str,
        consumer: Arc<dyn QueueConsumer>,
    ) -> CoreResult<ConsumerTag> {
        let mut queues = self.queues.lock().await;
        let entry = queues
            .entry(client_id.to_string())
            .or_insert_with(QueueEntry::new);
        if entry.consumer.is_some() {
            return Err(CoreError::Broker(format!(
                "queue for client {client_id} already has a consumer"
            )));
        }

        let tag = ConsumerTag(Uuid::new_v4().simple().to_string());
        let cancel = CancellationToken::new();
        entry.consumer = Some(ActiveConsumer {
            tag: tag.clone(),
            cancel: cancel.clone(),
        });

        let rx = Arc::clone(&entry.rx);
        let requeue = entry.tx.clone();
        let client = client_id.to_string();
        tokio::spawn(async move {
            let mut rx = rx.lock().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(payload) => {
                            if let Err(err) = consumer.handle(&client, payload.clone()).await {
                                warn!(client_id = %client, error = %err, "consumer failed, requeueing");
                                let _ = requeue.send(payload);
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!(client_id = %client, "consumer loop stopped");
        });

        Ok(tag)
    }

    async fn unbind(&self, client_id: &str, tag: &ConsumerTag) -> CoreResult<()> {
        let epoch = {
            let mut queues = self.queues.lock().await;
            let entry = match queues.get_mut(client_id) {
                Some(entry) => entry,
                None => return Ok(()),
            };
            match &entry.consumer {
                Some(active) if active.tag == *tag => {
                    active.cancel.cancel();
                    entry.consumer = None;
                }
                _ => {
                    debug!(client_id, "unbind with non-current tag ignored");
                    return Ok(());
                }
            }
            entry.reclaim_epoch += 1;
            entry.reclaim_epoch
        };

        // Keep the queue around briefly so a reconnecting client does not
        // lose buffered messages. A timer left over from an earlier unbind
        // sees a newer epoch and backs off.
        let queues = Arc::clone(&self.queues);
        let client = client_id.to_string();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut queues = queues.lock().await;
            if let Some(entry) = queues.get(&client) {
                if entry.consumer.is_none() && entry.reclaim_epoch == epoch {
                    queues.remove(&client);
                    debug!(client_id = %client, "idle queue reclaimed");
                }
            }
        });
        Ok(())
    }
}
