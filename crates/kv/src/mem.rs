use crate::{Counter, Delivery, Envelope, JobQueue};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// In-process counter with TTL semantics matching the Redis form.
#[derive(Default)]
pub struct MemoryCounter {
    entries: Mutex<HashMap<String, (f64, Instant)>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Counter for MemoryCounter {
    async fn incr_f64(&self, key: &str, delta: f64, ttl: Duration) -> anyhow::Result<f64> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let entry = entries
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(value, expires)| (*value, *expires));

        let (value, expires) = match entry {
            Some((value, expires)) => (value + delta, expires),
            None => (delta, now + ttl),
        };
        entries.insert(key.to_string(), (value, expires));
        Ok(value)
    }

    async fn get_f64(&self, key: &str) -> anyhow::Result<Option<f64>> {
        let entries = self.entries.lock().unwrap();
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(value, _)| *value))
    }
}

#[derive(Default)]
struct QueueInner {
    ready: VecDeque<Envelope>,
    delayed: Vec<(Instant, Envelope)>,
    inflight: HashMap<String, (Instant, Envelope)>,
}

/// In-process queue used by tests and by single-process deployments.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<QueueInner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move due delayed messages and expired in-flight deliveries back to
    /// the ready queue.
    fn promote(inner: &mut QueueInner, now: Instant) {
        let mut still_delayed = Vec::new();
        for (ready_at, envelope) in inner.delayed.drain(..) {
            if ready_at <= now {
                inner.ready.push_back(envelope);
            } else {
                still_delayed.push((ready_at, envelope));
            }
        }
        inner.delayed = still_delayed;

        let expired: Vec<String> = inner
            .inflight
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some((_, mut envelope)) = inner.inflight.remove(&receipt) {
                envelope.attempt += 1;
                inner.ready.push_back(envelope);
            }
        }
    }
}

#[async_trait::async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ready.push_back(Envelope::new(payload));
        Ok(())
    }

    async fn enqueue_delayed(
        &self,
        payload: serde_json::Value,
        delay: Duration,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .delayed
            .push((Instant::now() + delay, Envelope::new(payload)));
        Ok(())
    }

    async fn dequeue(&self, visibility: Duration) -> anyhow::Result<Option<Delivery>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        Self::promote(&mut inner, now);

        let Some(envelope) = inner.ready.pop_front() else {
            return Ok(None);
        };
        let receipt = envelope.id.clone();
        inner
            .inflight
            .insert(receipt.clone(), (now + visibility, envelope.clone()));
        Ok(Some(Delivery { receipt, envelope }))
    }

    async fn ack(&self, receipt: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.inflight.remove(receipt);
        Ok(())
    }

    async fn nack(&self, receipt: &str, delay: Duration) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((_, mut envelope)) = inner.inflight.remove(receipt) {
            envelope.attempt += 1;
            inner.delayed.push((Instant::now() + delay, envelope));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn counter_accumulates_and_reports() {
        let counter = MemoryCounter::new();
        let one_hour = Duration::from_secs(3600);

        let v = counter.incr_f64("cost:2025-03-01", 1.5, one_hour).await.unwrap();
        assert_eq!(v, 1.5);
        let v = counter.incr_f64("cost:2025-03-01", 2.25, one_hour).await.unwrap();
        assert_eq!(v, 3.75);
        assert_eq!(
            counter.get_f64("cost:2025-03-01").await.unwrap(),
            Some(3.75)
        );
        assert_eq!(counter.get_f64("cost:other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn queue_round_trip_with_ack() {
        let queue = MemoryQueue::new();
        queue.enqueue(json!({"job_id": "a"})).await.unwrap();

        let delivery = queue
            .dequeue(Duration::from_secs(30))
            .await
            .unwrap()
            .expect("a delivery");
        assert_eq!(delivery.envelope.payload["job_id"], "a");
        assert_eq!(delivery.envelope.attempt, 1);

        // In-flight messages are invisible.
        assert!(queue.dequeue(Duration::from_secs(30)).await.unwrap().is_none());

        queue.ack(&delivery.receipt).await.unwrap();
        assert!(queue.dequeue(Duration::from_secs(30)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_redelivers_with_advanced_attempt() {
        let queue = MemoryQueue::new();
        queue.enqueue(json!({"job_id": "b"})).await.unwrap();

        let first = queue
            .dequeue(Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        queue.nack(&first.receipt, Duration::ZERO).await.unwrap();

        let second = queue
            .dequeue(Duration::from_secs(30))
            .await
            .unwrap()
            .expect("redelivery");
        assert_eq!(second.envelope.id, first.envelope.id);
        assert_eq!(second.envelope.attempt, 2);
    }

    #[tokio::test]
    async fn expired_visibility_makes_message_visible_again() {
        let queue = MemoryQueue::new();
        queue.enqueue(json!({"job_id": "c"})).await.unwrap();

        let first = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
        // Visibility of zero: immediately re-deliverable without an ack.
        let second = queue
            .dequeue(Duration::from_secs(30))
            .await
            .unwrap()
            .expect("expired redelivery");
        assert_eq!(second.envelope.id, first.envelope.id);
        assert_eq!(second.envelope.attempt, 2);
    }

    #[tokio::test]
    async fn delayed_enqueue_is_not_immediately_visible() {
        let queue = MemoryQueue::new();
        queue
            .enqueue_delayed(json!({"job_id": "d"}), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(queue.dequeue(Duration::from_secs(30)).await.unwrap().is_none());
    }
}
