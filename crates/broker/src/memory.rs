use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::{
    BrokerError, BrokerMessage, Result,
    publisher::{EventPublisher, MessageStream, MessageSubscriber},
};

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: u32 = 4;

/// Default number of messages retained per topic.
pub const DEFAULT_RETENTION: usize = 10_000;

#[derive(Default)]
struct TopicState {
    /// The most recent messages, in publish order.
    log: VecDeque<BrokerMessage>,
    subscribers: Vec<mpsc::UnboundedSender<BrokerMessage>>,
    /// Remaining publishes to reject.
    failures: u32,
}

/// In-memory partitioned broker.
///
/// Keys are hashed onto a fixed number of partitions. Each topic retains
/// at most `retention` messages; older ones are evicted. A subscriber first
/// receives the retained log (earliest retained offset) and then live
/// messages, all through one ordered channel, so per-key publish order is
/// preserved.
#[derive(Clone)]
pub struct InMemoryBroker {
    partitions: u32,
    retention: usize,
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }
}

impl InMemoryBroker {
    /// Creates a broker with the default partition count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker with `partitions` partitions per topic.
    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            retention: DEFAULT_RETENTION,
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sets how many messages each topic retains.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Returns the partition a key is routed to.
    pub fn partition_for(&self, key: &str) -> u32 {
        // FNV-1a: stable across processes and toolchain versions
        let hash = key.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        });
        (hash % u64::from(self.partitions)) as u32
    }

    /// Rejects the next `count` publishes to `topic`.
    pub async fn fail_next_publishes(&self, topic: &str, count: u32) {
        let mut topics = self.topics.lock().await;
        topics.entry(topic.to_string()).or_default().failures = count;
    }

    /// Returns the retained messages of `topic`, in publish order.
    pub async fn messages(&self, topic: &str) -> Vec<BrokerMessage> {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|state| state.log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the messages of one partition, in publish order.
    pub async fn partition_messages(&self, topic: &str, partition: u32) -> Vec<BrokerMessage> {
        self.messages(topic)
            .await
            .into_iter()
            .filter(|m| m.partition == Some(partition))
            .collect()
    }

    /// Returns the number of messages retained for `topic`.
    pub async fn message_count(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(topic).map(|state| state.log.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish_message(&self, mut message: BrokerMessage) -> Result<()> {
        let partition = self.partition_for(&message.key);
        let mut topics = self.topics.lock().await;
        let state = topics.entry(message.topic.clone()).or_default();

        if state.failures > 0 {
            state.failures -= 1;
            return Err(BrokerError::Transport {
                topic: message.topic,
                reason: "broker unavailable".to_string(),
            });
        }

        message.partition = Some(partition);
        state
            .subscribers
            .retain(|subscriber| subscriber.send(message.clone()).is_ok());
        if state.log.len() == self.retention {
            state.log.pop_front();
        }
        state.log.push_back(message);
        Ok(())
    }
}

#[async_trait]
impl MessageSubscriber for InMemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        for message in &state.log {
            // Receiver is alive: it is still owned by this function
            let _ = tx.send(message.clone());
        }
        state.subscribers.push(tx);

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        Ok(Box::pin(stream))
    }
}
