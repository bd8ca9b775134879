//! In-process broadcast bus.
//!
//! Every subscriber of a topic receives every payload published on it,
//! mirroring the shared medium of the real bus. Published payloads are
//! recorded so callers can inspect what went out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::transport::{Flow, MessageHandler, PubSub, SubscriptionHandle};
use crate::NetworkError;

const TOPIC_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    settle_delay: Duration,
    offline: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that waits `settle_delay` between "connecting" and publishing.
    pub fn with_settle_delay(settle_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                settle_delay,
                ..Default::default()
            }),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        lock(&self.inner.topics)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Deliver a payload to current subscribers without going through
    /// `connect_and_publish`. Returns how many subscribers received it.
    pub fn inject(&self, topic: &str, payload: Vec<u8>) -> usize {
        self.sender(topic).send(payload).unwrap_or(0)
    }

    /// Payloads published on `topic` through `connect_and_publish`, oldest first.
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        lock(&self.inner.published)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Total number of `connect_and_publish` calls that succeeded.
    pub fn publish_count(&self) -> usize {
        lock(&self.inner.published).len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.inner.topics)
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Make connects fail, as if the agent node were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), NetworkError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Connect("memory bus is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PubSub for MemoryBus {
    async fn connect_and_publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.check_online()?;
        if !self.inner.settle_delay.is_zero() {
            tokio::time::sleep(self.inner.settle_delay).await;
        }
        lock(&self.inner.published).push((topic.to_string(), payload.clone()));
        let receivers = self.inject(topic, payload);
        tracing::debug!(topic, receivers, "Published on memory bus");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        mut on_message: MessageHandler,
    ) -> Result<SubscriptionHandle, NetworkError> {
        self.check_online()?;
        let mut rx = self.sender(topic).subscribe();
        let topic_name = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        if on_message(payload) == Flow::Stop {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %topic_name, skipped, "Subscriber lagged; messages lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!(topic = %topic_name, "Memory bus subscription ended");
        });

        Ok(SubscriptionHandle::new(topic, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inject_without_subscribers() {
        let bus = MemoryBus::new();
        assert_eq!(bus.inject("t", b"x".to_vec()), 0);
        assert_eq!(bus.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_bus_rejects_publish() {
        let bus = MemoryBus::new();
        bus.set_offline(true);
        let result = bus.connect_and_publish("t", b"x".to_vec()).await;
        assert!(matches!(result, Err(NetworkError::Connect(_))));
        assert!(bus.published("t").is_empty());
    }
}
