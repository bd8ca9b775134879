//! Correlated request engine.
//!
//! Turns the fire-and-forget bus into request/response: subscribe to the
//! response topic first, publish the query, then wait for the first matching
//! message. One deadline covers the whole round. A message matches when it
//! decodes, carries the expected address and carries the field that marks the
//! awaited response kind. Everything else on the topic is ignored.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use offsetting_network::{Flow, MessageHandler, NetworkError, PubSub};
use offsetting_protocol::{codec, AgentResponse};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::ClientError;

/// Lifecycle of a single correlated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Subscribed,
    Resolved,
    TimedOut,
}

/// Decides whether an inbound message answers the pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFilter {
    pub expected_address: String,
    pub discriminator: &'static str,
}

impl ResponseFilter {
    pub fn new(expected_address: impl Into<String>, discriminator: &'static str) -> Self {
        Self {
            expected_address: expected_address.into(),
            discriminator,
        }
    }

    /// Filter for responses of kind `R` addressed to `expected_address`.
    pub fn for_response<R: AgentResponse>(expected_address: impl Into<String>) -> Self {
        Self::new(expected_address, R::DISCRIMINATOR)
    }

    pub fn matches(&self, message: &Value) -> bool {
        message.get("address").and_then(Value::as_str) == Some(self.expected_address.as_str())
            && message.get(self.discriminator).is_some()
    }
}

/// Correlation record for one query awaiting its response.
#[derive(Debug)]
pub struct PendingRequest {
    id: Uuid,
    topic: String,
    deadline: Duration,
    filter: ResponseFilter,
    phase: RequestPhase,
}

impl PendingRequest {
    pub fn new(topic: impl Into<String>, filter: ResponseFilter, deadline: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            deadline,
            filter,
            phase: RequestPhase::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn filter(&self) -> &ResponseFilter {
        &self.filter
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    fn advance(&mut self, next: RequestPhase) {
        tracing::debug!(
            request_id = %self.id,
            topic = %self.topic,
            from = ?self.phase,
            to = ?next,
            "Request phase change"
        );
        self.phase = next;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a response topic busy until dropped.
struct InFlight<'a> {
    topics: &'a Mutex<HashSet<String>>,
    topic: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.topics).remove(&self.topic);
    }
}

/// Issues correlated requests over a [`PubSub`] bus.
///
/// At most one request per response topic may be pending at a time.
pub struct RequestEngine {
    bus: Arc<dyn PubSub>,
    in_flight: Mutex<HashSet<String>>,
}

impl RequestEngine {
    pub fn new(bus: Arc<dyn PubSub>) -> Self {
        Self {
            bus,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, response_topic: &str) -> bool {
        lock(&self.in_flight).contains(response_topic)
    }

    fn claim_topic(&self, response_topic: &str) -> Result<InFlight<'_>, ClientError> {
        if !lock(&self.in_flight).insert(response_topic.to_string()) {
            return Err(ClientError::RequestInFlight(response_topic.to_string()));
        }
        Ok(InFlight {
            topics: &self.in_flight,
            topic: response_topic.to_string(),
        })
    }

    /// Subscribe to `response_topic`, publish the payload produced by
    /// `prepare` on `query_topic`, and wait for the first response that passes
    /// `filter`.
    ///
    /// `deadline` bounds the whole round: subscribing, preparing the payload,
    /// connecting and publishing, and waiting.
    pub async fn request<R, P>(
        &self,
        query_topic: &str,
        response_topic: &str,
        filter: ResponseFilter,
        deadline: Duration,
        prepare: P,
    ) -> Result<R, ClientError>
    where
        R: AgentResponse,
        P: Future<Output = Result<Vec<u8>, ClientError>>,
    {
        let _in_flight = self.claim_topic(response_topic)?;
        let deadline_at = Instant::now() + deadline;
        let mut pending = PendingRequest::new(response_topic, filter, deadline);
        let request_id = pending.id;

        let round = async {
            let (tx, rx) = oneshot::channel();
            let handler = response_handler::<R>(pending.filter.clone(), request_id, tx);
            let subscription = self.bus.subscribe(response_topic, handler).await?;
            pending.advance(RequestPhase::Subscribed);

            let payload = prepare.await?;
            self.bus.connect_and_publish(query_topic, payload).await?;
            tracing::info!(
                %request_id,
                query_topic,
                response_topic,
                "Query published, waiting for response"
            );

            let response = rx.await.map_err(|_| {
                NetworkError::Subscribe(format!(
                    "subscription on '{response_topic}' ended before a response arrived"
                ))
            })?;
            subscription.cancel();
            Ok::<R, ClientError>(response)
        };

        // Dropping the round on expiry drops the subscription handle, which
        // aborts the listening task.
        let outcome = tokio::time::timeout_at(deadline_at, round).await;
        match outcome {
            Ok(Ok(response)) => {
                pending.advance(RequestPhase::Resolved);
                Ok(response)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                pending.advance(RequestPhase::TimedOut);
                tracing::warn!(%request_id, response_topic, ?deadline, "Request timed out");
                Err(ClientError::Timeout {
                    topic: response_topic.to_string(),
                    after: deadline,
                })
            }
        }
    }
}

/// Subscription callback that forwards the first matching response and then
/// stops the subscription.
fn response_handler<R: AgentResponse>(
    filter: ResponseFilter,
    request_id: Uuid,
    tx: oneshot::Sender<R>,
) -> MessageHandler {
    let mut slot = Some(tx);
    Box::new(move |payload: Vec<u8>| {
        let Some(response) = accept::<R>(&filter, request_id, &payload) else {
            return Flow::Continue;
        };
        if let Some(tx) = slot.take() {
            // Receiver gone means the deadline already won.
            let _ = tx.send(response);
        }
        Flow::Stop
    })
}

fn accept<R: AgentResponse>(filter: &ResponseFilter, request_id: Uuid, payload: &[u8]) -> Option<R> {
    let message = match codec::decode_value(payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(%request_id, error = %e, "Ignoring undecodable message");
            return None;
        }
    };
    if !filter.matches(&message) {
        tracing::debug!(%request_id, "Ignoring message for another address or of another kind");
        return None;
    }
    match serde_json::from_value::<R>(message) {
        Ok(response) => {
            tracing::debug!(%request_id, address = response.address(), "Matched response");
            Some(response)
        }
        Err(e) => {
            tracing::debug!(%request_id, error = %e, "Ignoring malformed response");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsetting_network::{MemoryBus, SubscriptionHandle};
    use offsetting_protocol::{CompensationStatus, OffsetReport};
    use serde_json::json;

    const ADDRESS: &str = "4Gx5nZyZ8EJ3iF2CKqAL3cJZgPWrjuzS8SBjqK2TAqmeh4k2";
    const QUERY: &str = "status_query";
    const RESPONSE: &str = "status_response";

    fn encoded(value: Value) -> Vec<u8> {
        codec::encode(&value).unwrap()
    }

    /// Answers every query on `QUERY` with `replies`, in order.
    async fn agent(bus: &MemoryBus, replies: Vec<Vec<u8>>) -> SubscriptionHandle {
        let responder = bus.clone();
        bus.subscribe(
            QUERY,
            Box::new(move |_query: Vec<u8>| {
                for reply in &replies {
                    responder.inject(RESPONSE, reply.clone());
                }
                Flow::Continue
            }),
        )
        .await
        .unwrap()
    }

    async fn status_request(
        engine: &RequestEngine,
        deadline: Duration,
    ) -> Result<CompensationStatus, ClientError> {
        engine
            .request::<CompensationStatus, _>(
                QUERY,
                RESPONSE,
                ResponseFilter::for_response::<CompensationStatus>(ADDRESS),
                deadline,
                std::future::ready(Ok::<_, ClientError>(encoded(json!({"address": ADDRESS, "kwh_current": 1.0})))),
            )
            .await
    }

    #[test]
    fn test_filter_requires_address_and_discriminator() {
        let filter = ResponseFilter::for_response::<OffsetReport>(ADDRESS);
        assert_eq!(filter.discriminator, "success");
        assert!(filter.matches(&json!({"address": ADDRESS, "success": false})));
        assert!(!filter.matches(&json!({"address": "someone else", "success": true})));
        assert!(!filter.matches(&json!({"address": ADDRESS, "kwh_to_compensate": 1.0})));
        assert!(!filter.matches(&json!({"success": true})));
    }

    #[test]
    fn test_pending_request_starts_idle() {
        let pending = PendingRequest::new(RESPONSE, ResponseFilter::new(ADDRESS, "x"), Duration::from_secs(3));
        assert_eq!(pending.phase(), RequestPhase::Idle);
        assert_eq!(pending.topic(), RESPONSE);
        assert_eq!(pending.deadline(), Duration::from_secs(3));
        assert_eq!(pending.filter().expected_address, ADDRESS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_on_matching_response() {
        let bus = MemoryBus::new();
        let _agent = agent(
            &bus,
            vec![
                b"not a dict at all".to_vec(),
                encoded(json!({"address": "someone else", "kwh_to_compensate": 1.0})),
                encoded(json!({"address": ADDRESS, "report": "wrong kind"})),
                encoded(json!({"address": ADDRESS, "kwh_to_compensate": 40.0, "last_compensation_date": None::<String>})),
            ],
        )
        .await;
        let engine = RequestEngine::new(Arc::new(bus.clone()));

        let status = status_request(&engine, Duration::from_secs(10)).await.unwrap();
        assert_eq!(status.kwh_to_compensate, 40.0);
        assert_eq!(status.last_compensation_date, None);
        assert_eq!(bus.published(QUERY).len(), 1);
        assert!(!engine.is_in_flight(RESPONSE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_match_wins() {
        let bus = MemoryBus::new();
        let _agent = agent(
            &bus,
            vec![
                encoded(json!({"address": ADDRESS, "kwh_to_compensate": 1.0})),
                encoded(json!({"address": ADDRESS, "kwh_to_compensate": 2.0})),
            ],
        )
        .await;
        let engine = RequestEngine::new(Arc::new(bus));

        let status = status_request(&engine, Duration::from_secs(10)).await.unwrap();
        assert_eq!(status.kwh_to_compensate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_addresses_lead_to_timeout() {
        let bus = MemoryBus::new();
        let _agent = agent(
            &bus,
            vec![encoded(json!({"address": "someone else", "kwh_to_compensate": 1.0}))],
        )
        .await;
        let engine = RequestEngine::new(Arc::new(bus.clone()));

        let err = status_request(&engine, Duration::from_secs(10)).await.unwrap_err();
        match err {
            ClientError::Timeout { topic, after } => {
                assert_eq!(topic, RESPONSE);
                assert_eq!(after, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!engine.is_in_flight(RESPONSE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_on_same_topic_is_rejected() {
        let bus = MemoryBus::new();
        let engine = Arc::new(RequestEngine::new(Arc::new(bus.clone())));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { status_request(&engine, Duration::from_secs(10)).await }
        });
        while bus.publish_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let second = status_request(&engine, Duration::from_secs(10)).await;
        assert!(matches!(second, Err(ClientError::RequestInFlight(topic)) if topic == RESPONSE));
        assert_eq!(bus.publish_count(), 1);

        assert!(first.await.unwrap().unwrap_err().is_timeout());
        assert!(!engine.is_in_flight(RESPONSE));
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_network_error() {
        let bus = MemoryBus::new();
        let engine = RequestEngine::new(Arc::new(bus.clone()));
        bus.set_offline(true);

        let err = status_request(&engine, Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(NetworkError::Connect(_))));
        assert!(!engine.is_in_flight(RESPONSE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_settle_delay() {
        let bus = MemoryBus::with_settle_delay(Duration::from_secs(30));
        let engine = RequestEngine::new(Arc::new(bus.clone()));
        let started = Instant::now();

        let err = status_request(&engine, Duration::from_secs(10)).await.unwrap_err();

        assert!(err.is_timeout());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(11), "{elapsed:?}");
        assert_eq!(bus.publish_count(), 0);
        assert!(!engine.is_in_flight(RESPONSE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_payload_preparation() {
        let bus = MemoryBus::new();
        let engine = RequestEngine::new(Arc::new(bus.clone()));
        let started = Instant::now();

        let slow_payload = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ClientError>(encoded(json!({"address": ADDRESS, "kwh_current": 1.0})))
        };
        let err = engine
            .request::<CompensationStatus, _>(
                QUERY,
                RESPONSE,
                ResponseFilter::for_response::<CompensationStatus>(ADDRESS),
                Duration::from_secs(10),
                slow_payload,
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(11));
        assert_eq!(bus.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_preparation_failure_skips_publish() {
        let bus = MemoryBus::new();
        let engine = RequestEngine::new(Arc::new(bus.clone()));

        let err = engine
            .request::<CompensationStatus, _>(
                QUERY,
                RESPONSE,
                ResponseFilter::for_response::<CompensationStatus>(ADDRESS),
                Duration::from_secs(10),
                std::future::ready(Err(ClientError::Config("no payload".into()))),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Config(_)));
        assert_eq!(bus.publish_count(), 0);
        assert!(!engine.is_in_flight(RESPONSE));
    }
}
