//! Key-value primitives the pipeline relies on: an atomic float counter with
//! TTL (backing the daily cost circuit breaker) and a job queue with
//! acknowledge / negative-acknowledge / delayed re-enqueue semantics.
//!
//! Both come in a Redis-backed form for production and an in-process form
//! for tests; the in-process form is a first-class peer, not a mock.

mod mem;
mod redis;

pub use mem::{MemoryCounter, MemoryQueue};
pub use redis::{connect as connect_redis, RedisCounter, RedisQueue};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An atomic floating-point counter with expiry, keyed by string.
#[async_trait::async_trait]
pub trait Counter: Send + Sync {
    /// Atomically add `delta` to `key` and return the post-increment value.
    /// The TTL is applied only when the key is first created, so a running
    /// window keeps its original expiry.
    async fn incr_f64(&self, key: &str, delta: f64, ttl: Duration) -> anyhow::Result<f64>;

    async fn get_f64(&self, key: &str) -> anyhow::Result<Option<f64>>;
}

/// The wire envelope carried through the queue. `attempt` counts deliveries
/// of this payload, starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub attempt: u32,
    pub payload: serde_json::Value,
}

/// A dequeued message. The receipt must be passed back to `ack` or `nack`;
/// an unacknowledged delivery becomes visible again after the visibility
/// timeout elapses.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: String,
    pub envelope: Envelope,
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, payload: serde_json::Value) -> anyhow::Result<()>;

    async fn enqueue_delayed(
        &self,
        payload: serde_json::Value,
        delay: Duration,
    ) -> anyhow::Result<()>;

    /// Pop the next ready message, making it invisible for `visibility`.
    /// Returns `None` when the queue is empty.
    async fn dequeue(&self, visibility: Duration) -> anyhow::Result<Option<Delivery>>;

    /// Settle a delivery permanently.
    async fn ack(&self, receipt: &str) -> anyhow::Result<()>;

    /// Return a delivery to the queue after `delay`, advancing its attempt
    /// counter.
    async fn nack(&self, receipt: &str, delay: Duration) -> anyhow::Result<()>;
}

impl Envelope {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            attempt: 1,
            payload,
        }
    }
}
