//! Transport abstraction the stream runner drives: a `Topic` enum, a
//! `Transport` trait implemented by whatever pub/sub client a deployment
//! actually wires in, and the retryable/fatal fault classification the
//! runner needs for its backoff loop.
//!
//! This crate ships one concrete implementation, [`InMemoryTransport`], a
//! pair of in-process channels useful for integration tests and local
//! runs; a production deployment swaps in a client for whatever message
//! bus the network actually uses without the runner or engine crates
//! changing.

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// The handful of topics the engine reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Observation,
    FiredrillObservation,
    Alert,
    FiredrillAlert,
    ConnectionTest,
}

/// A transport-level fault, classified so the runner knows whether to
/// retry or give up.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reconnect with backoff: a dropped connection, a timed-out read, a
    /// broker that is temporarily unavailable.
    #[error("retryable transport fault: {0}")]
    Retryable(String),
    /// Give up immediately: bad credentials, an unrecoverable protocol
    /// violation, a topic that does not exist.
    #[error("fatal transport fault: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// A pub/sub client abstraction: subscribe to a topic, publish to one,
/// and decide whether a transport error should trigger a reconnect or
/// terminate the runner.
///
/// `topic_name` carries the operator-configured name for `topic` (e.g.
/// `OBSERVATION_TOPIC`/`FIREDRILL_OBSERVATION_TOPIC` resolved from
/// `EngineConfig`); a real broker client subscribes/publishes against
/// that string, while `topic` itself remains the fixed enum the caller
/// uses to route internally.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Blocks until the next message arrives on `topic`, or returns a
    /// classified fault.
    async fn receive(&self, topic: Topic, topic_name: &str) -> Result<Value, TransportError>;

    /// Publishes `payload` to `topic`. Implementations serving a
    /// non-leader replica may no-op here instead of actually sending.
    async fn publish(&self, topic: Topic, topic_name: &str, payload: Value) -> Result<(), TransportError>;
}

/// An in-process transport backed by one `mpsc` channel per topic. Useful
/// for integration tests driving the full admit-to-alert pipeline without
/// a real broker, and as a local single-process deployment mode.
pub struct InMemoryTransport {
    observation_rx: Mutex<mpsc::UnboundedReceiver<Value>>,
    published: Arc<Mutex<Vec<(Topic, Value)>>>,
}

#[derive(Clone)]
pub struct InMemoryTransportHandle {
    observation_tx: mpsc::UnboundedSender<Value>,
}

impl InMemoryTransportHandle {
    /// Feeds a payload into the observation topic as if it had arrived
    /// from the bus.
    pub fn send_observation(&self, payload: Value) {
        let _ = self.observation_tx.send(payload);
    }
}

impl InMemoryTransport {
    pub fn new() -> (Self, InMemoryTransportHandle) {
        let (observation_tx, observation_rx) = mpsc::unbounded_channel();
        let transport = Self { observation_rx: Mutex::new(observation_rx), published: Arc::new(Mutex::new(Vec::new())) };
        (transport, InMemoryTransportHandle { observation_tx })
    }

    /// Every payload published so far, in publish order. Used by tests to
    /// assert on emitted alerts without a real bus to inspect.
    pub async fn published(&self) -> Vec<(Topic, Value)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn receive(&self, topic: Topic, _topic_name: &str) -> Result<Value, TransportError> {
        match topic {
            Topic::Observation | Topic::FiredrillObservation => {
                let mut rx = self.observation_rx.lock().await;
                rx.recv().await.ok_or_else(|| TransportError::Fatal("observation channel closed".to_string()))
            }
            other => Err(TransportError::Fatal(format!("in-memory transport has no subscriber source for {other:?}"))),
        }
    }

    async fn publish(&self, topic: Topic, _topic_name: &str, payload: Value) -> Result<(), TransportError> {
        self.published.lock().await.push((topic, payload));
        Ok(())
    }
}

/// Computes the jittered backoff delay for retry attempt `count` (1-indexed):
/// `growth_base_seconds^count` seconds, plus a random jitter drawn uniformly
/// from `[0, growth_base_seconds^count * jitter_fraction]` so concurrent
/// replicas don't all reconnect in lockstep.
pub fn backoff_delay(count: u32, growth_base_seconds: f64, jitter_fraction: f64) -> std::time::Duration {
    let base = growth_base_seconds.powi(count as i32);
    let max_jitter = base * jitter_fraction;
    let jitter = if max_jitter > 0.0 { rand::thread_rng().gen_range(0.0..=max_jitter) } else { 0.0 };
    std::time::Duration::from_secs_f64(base + jitter)
}
