//! Agent node pub/sub over JSON-RPC 2.0 on a WebSocket.
//!
//! Methods used:
//! - `pubsub_connect(multiaddr)`: dial the agent's pub/sub node
//! - `pubsub_publish(topic, message)`: returns an ack flag
//! - `pubsub_subscribe(topic)`: returns a subscription id; messages then
//!   arrive as notifications carrying `params.result.data`
//! - `pubsub_unsubscribe(id)`

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use offsetting_protocol::{DEFAULT_AGENT_NODE, DEFAULT_RPC_ENDPOINT, DEFAULT_SETTLE_DELAY_MS};

use crate::transport::{Flow, MessageHandler, PubSub, SubscriptionHandle};
use crate::NetworkError;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the agent node transport.
#[derive(Debug, Clone)]
pub struct RpcPubSubConfig {
    /// WebSocket JSON-RPC endpoint of the node.
    pub endpoint: String,
    /// Multiaddr of the agent's pub/sub node to connect to.
    pub agent_node: String,
    /// Wait between `pubsub_connect` and `pubsub_publish`.
    pub settle_delay: Duration,
    /// Upper bound for a single RPC call.
    pub call_timeout: Duration,
}

impl Default for RpcPubSubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            agent_node: DEFAULT_AGENT_NODE.to_string(),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Pub/sub through the agent node's JSON-RPC API.
///
/// Every publish and every subscription opens its own WebSocket connection.
#[derive(Debug, Clone)]
pub struct RpcPubSub {
    config: RpcPubSubConfig,
}

impl RpcPubSub {
    pub fn new(config: RpcPubSubConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RpcPubSubConfig {
        &self.config
    }

    async fn open(&self) -> Result<RpcConnection, NetworkError> {
        let (ws, _) = tokio::time::timeout(self.config.call_timeout, connect_async(self.config.endpoint.as_str()))
            .await
            .map_err(|_| NetworkError::Connect(format!("connect to {} timed out", self.config.endpoint)))?
            .map_err(|e| NetworkError::Connect(format!("{}: {e}", self.config.endpoint)))?;
        tracing::debug!(endpoint = %self.config.endpoint, "Connected to agent node RPC");
        Ok(RpcConnection {
            ws,
            next_id: 1,
            call_timeout: self.config.call_timeout,
        })
    }
}

#[async_trait]
impl PubSub for RpcPubSub {
    async fn connect_and_publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), NetworkError> {
        let message = String::from_utf8(payload)
            .map_err(|e| NetworkError::Publish(format!("payload is not utf-8: {e}")))?;

        let mut conn = self.open().await?;
        let connected = conn
            .call("pubsub_connect", json!([self.config.agent_node]))
            .await?;
        tracing::debug!(agent_node = %self.config.agent_node, result = %connected, "pubsub_connect");

        tokio::time::sleep(self.config.settle_delay).await;

        let ack = conn.call("pubsub_publish", json!([topic, message])).await?;
        tracing::debug!(topic, result = %ack, "pubsub_publish");
        conn.close().await;

        if ack == Value::Bool(false) {
            return Err(NetworkError::Publish(format!("node refused publish on '{topic}'")));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        mut on_message: MessageHandler,
    ) -> Result<SubscriptionHandle, NetworkError> {
        let mut conn = self.open().await?;
        let subscription_id = conn
            .call("pubsub_subscribe", json!([topic]))
            .await
            .map_err(|e| NetworkError::Subscribe(e.to_string()))?;
        tracing::debug!(topic, subscription = %subscription_id, "Subscribed");

        let topic_name = topic.to_string();
        let task = tokio::spawn(async move {
            loop {
                let notification = match conn.next_notification().await {
                    Some(Ok(n)) => n,
                    Some(Err(e)) => {
                        tracing::warn!(topic = %topic_name, error = %e, "Subscription stream failed");
                        break;
                    }
                    None => {
                        tracing::debug!(topic = %topic_name, "Subscription stream closed");
                        break;
                    }
                };
                if notification["params"]["subscription"] != subscription_id {
                    continue;
                }
                let Some(payload) = notification_payload(&notification) else {
                    tracing::debug!(topic = %topic_name, "Notification without data ignored");
                    continue;
                };
                if on_message(payload) == Flow::Stop {
                    if let Err(e) = conn
                        .call("pubsub_unsubscribe", json!([subscription_id]))
                        .await
                    {
                        tracing::debug!(topic = %topic_name, error = %e, "Unsubscribe failed");
                    }
                    conn.close().await;
                    break;
                }
            }
        });

        Ok(SubscriptionHandle::new(topic, task))
    }
}

/// Extract the message bytes from a subscription notification.
///
/// `data` is either a string or an array of byte values; arrays are handed
/// on as their JSON text so the codec can normalize them.
pub fn notification_payload(notification: &Value) -> Option<Vec<u8>> {
    match &notification["params"]["result"]["data"] {
        Value::String(s) => Some(s.as_bytes().to_vec()),
        data @ Value::Array(_) => serde_json::to_vec(data).ok(),
        _ => None,
    }
}

struct RpcConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    call_timeout: Duration,
}

impl RpcConnection {
    /// Send a request and wait for the response with the matching id.
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, NetworkError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.ws
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| NetworkError::Rpc(format!("{method}: send failed: {e}")))?;

        let timeout = self.call_timeout;
        tokio::time::timeout(timeout, self.response(method, id))
            .await
            .map_err(|_| NetworkError::Rpc(format!("{method}: no response within {timeout:?}")))?
    }

    async fn response(&mut self, method: &str, id: u64) -> Result<Value, NetworkError> {
        loop {
            let frame = self
                .next_json()
                .await
                .ok_or_else(|| NetworkError::Rpc(format!("{method}: connection closed")))??;
            if frame["id"] != json!(id) {
                continue;
            }
            if let Some(error) = frame.get("error") {
                return Err(NetworkError::Rpc(format!("{method}: {error}")));
            }
            return Ok(frame.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    /// Next frame that is a notification (has a method, no id).
    async fn next_notification(&mut self) -> Option<Result<Value, NetworkError>> {
        loop {
            match self.next_json().await? {
                Ok(frame) if frame.get("method").is_some() => return Some(Ok(frame)),
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn next_json(&mut self) -> Option<Result<Value, NetworkError>> {
        loop {
            let message = match self.ws.next().await? {
                Ok(m) => m,
                Err(e) => return Some(Err(NetworkError::Rpc(format!("websocket: {e}")))),
            };
            let text = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Message::Close(_) => return None,
                _ => continue,
            };
            match serde_json::from_str::<Value>(&text) {
                Ok(frame) => return Some(Ok(frame)),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring non-JSON frame");
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::trace!(error = %e, "WebSocket close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_from_string_data() {
        let n = json!({"params": {"subscription": 1, "result": {"data": "{'a': 1}"}}});
        assert_eq!(notification_payload(&n).unwrap(), b"{'a': 1}".to_vec());
    }

    #[test]
    fn test_payload_from_byte_array() {
        let n = json!({"params": {"subscription": 1, "result": {"data": [123, 125]}}});
        assert_eq!(notification_payload(&n).unwrap(), b"[123,125]".to_vec());
    }

    #[test]
    fn test_payload_missing_data() {
        let n = json!({"params": {"subscription": 1, "result": {}}});
        assert!(notification_payload(&n).is_none());
    }

    #[test]
    fn test_default_config_points_at_agent_node() {
        let config = RpcPubSubConfig::default();
        assert!(config.endpoint.starts_with("wss://"));
        assert!(config.agent_node.starts_with("/dns/"));
        assert_eq!(config.settle_delay, Duration::from_secs(1));
    }
}
