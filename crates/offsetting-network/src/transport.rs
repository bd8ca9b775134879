//! The pub/sub primitive the correlated request engine is built on.
//!
//! - `connect_and_publish` connects to the bus, waits the settle delay and
//!   publishes one payload.
//! - `subscribe` returns once the subscription is live; the listening loop
//!   then runs on its own task and feeds every inbound payload to the handler
//!   until the handler returns [`Flow::Stop`] or the handle is cancelled.

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::NetworkError;

/// What a subscription should do after handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Callback invoked for every inbound payload on a subscribed topic.
pub type MessageHandler = Box<dyn FnMut(Vec<u8>) -> Flow + Send + 'static>;

#[async_trait]
pub trait PubSub: Send + Sync {
    /// Connect to the bus and publish a single payload on `topic`.
    async fn connect_and_publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), NetworkError>;

    /// Subscribe to `topic`. Returns once the subscription is established.
    async fn subscribe(
        &self,
        topic: &str,
        on_message: MessageHandler,
    ) -> Result<SubscriptionHandle, NetworkError>;
}

/// Handle to a running subscription loop.
///
/// Dropping or cancelling the handle aborts the loop. Cancellation is best
/// effort: a message already being handled completes first.
#[derive(Debug)]
pub struct SubscriptionHandle {
    topic: String,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn new(topic: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            topic: topic.into(),
            task,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the listening loop has ended on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        tracing::debug!(topic = %self.topic, "Cancelling subscription");
        // Drop aborts the task.
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
