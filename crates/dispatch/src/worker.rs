use crate::backoff::Backoff;
use crate::mem;
use kv::{Delivery, JobQueue};
use models::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

/// The registered actor a worker runs per message. The actor reports the
/// error class; the dispatcher owns the retry contract.
#[async_trait::async_trait]
pub trait Actor: Send + Sync + 'static {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), models::ProcessingError>;

    /// Invoked once a message is past retrying, before it is settled.
    async fn on_permanent_failure(&self, payload: serde_json::Value, error: &str);
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Concurrent tasks within this worker process.
    pub permits: u32,
    /// Poll interval when the queue runs dry.
    pub dequeue_interval: Duration,
    /// Queue visibility window; a task must finish (or the message is
    /// redelivered) within it.
    pub visibility: Duration,
    pub backoff: Backoff,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            permits: 1,
            dequeue_interval: Duration::from_secs(2),
            visibility: Duration::from_secs(600),
            backoff: Backoff::default(),
        }
    }
}

/// Serve the queue until `shutdown` resolves. In-flight tasks finish before
/// return; new claims stop immediately.
pub async fn serve(
    queue: Arc<dyn JobQueue>,
    actor: Arc<dyn Actor>,
    config: DispatcherConfig,
    shutdown: impl std::future::Future<Output = ()>,
) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.permits as usize));
    tokio::pin!(shutdown);

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit.expect("semaphore closed"),
            () = &mut shutdown => break,
        };

        let delivery = tokio::select! {
            result = dequeue_with_poll(queue.as_ref(), &config) => result,
            () = &mut shutdown => {
                drop(permit);
                break;
            }
        };

        let Some(delivery) = delivery else {
            drop(permit);
            continue;
        };

        let queue = queue.clone();
        let actor = actor.clone();
        let backoff = config.backoff;
        tokio::spawn(async move {
            run_one(queue.as_ref(), actor.as_ref(), backoff, delivery).await;
            drop(permit);
        });
    }

    tracing::info!("dispatcher signaled to stop, draining in-flight tasks");
    let _ = semaphore
        .acquire_many_owned(config.permits)
        .await
        .expect("semaphore closed");
}

/// Poll the queue until a message arrives. Sleeps with a 10% jitter between
/// empty polls so a fleet of workers spreads its dequeues.
async fn dequeue_with_poll(queue: &dyn JobQueue, config: &DispatcherConfig) -> Option<Delivery> {
    loop {
        match queue.dequeue(config.visibility).await {
            Ok(Some(delivery)) => return Some(delivery),
            Ok(None) => {}
            Err(err) => {
                tracing::error!(?err, "queue dequeue failed (will retry)");
            }
        }
        let jitter = 0.9 + rand::random::<f64>() * 0.2;
        tokio::time::sleep(config.dequeue_interval.mul_f64(jitter)).await;
    }
}

async fn run_one(queue: &dyn JobQueue, actor: &dyn Actor, backoff: Backoff, delivery: Delivery) {
    let Delivery { receipt, envelope } = delivery;
    let attempt = envelope.attempt;
    let before = mem::resident_bytes();
    tracing::debug!(message_id = %envelope.id, attempt, resident_bytes = before, "task starting");

    let outcome = actor.handle(envelope.payload.clone()).await;

    match outcome {
        Ok(()) => {
            if let Err(err) = queue.ack(&receipt).await {
                tracing::error!(?err, "ack failed, message will be redelivered");
            }
        }
        Err(error) if error.kind == ErrorKind::Transient && backoff.retryable(attempt) => {
            let delay = backoff.delay(attempt);
            tracing::warn!(
                message_id = %envelope.id,
                attempt,
                ?delay,
                %error,
                "transient failure, re-enqueueing with backoff"
            );
            if let Err(err) = queue.nack(&receipt, delay).await {
                tracing::error!(?err, "nack failed, visibility timeout will redeliver");
            }
        }
        Err(error) => {
            tracing::error!(
                message_id = %envelope.id,
                attempt,
                kind = ?error.kind,
                %error,
                "permanent failure, invoking failure hook"
            );
            actor
                .on_permanent_failure(envelope.payload.clone(), &error.to_string())
                .await;
            // Settled: permanent failures are not retried.
            if let Err(err) = queue.ack(&receipt).await {
                tracing::error!(?err, "ack failed after permanent failure");
            }
        }
    }

    // Per-task allocations are dropped by now; record the footprint delta.
    let after = mem::resident_bytes();
    tracing::debug!(
        message_id = %envelope.id,
        resident_bytes_before = before,
        resident_bytes_after = after,
        "task finished"
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use models::ProcessingError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedActor {
        failures_before_success: AtomicU32,
        kind: ErrorKind,
        handled: AtomicU32,
        permanent: Mutex<Vec<String>>,
    }

    impl ScriptedActor {
        fn new(failures_before_success: u32, kind: ErrorKind) -> Self {
            Self {
                failures_before_success: AtomicU32::new(failures_before_success),
                kind,
                handled: AtomicU32::new(0),
                permanent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Actor for ScriptedActor {
        async fn handle(&self, _payload: serde_json::Value) -> Result<(), ProcessingError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if self.failures_before_success.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
            Err(ProcessingError::new(self.kind, "scripted failure"))
        }

        async fn on_permanent_failure(&self, _payload: serde_json::Value, error: &str) {
            self.permanent.lock().unwrap().push(error.to_string());
        }
    }

    async fn drive(queue: &kv::MemoryQueue, actor: &ScriptedActor, rounds: u32) {
        let backoff = Backoff {
            min: Duration::ZERO,
            max: Duration::ZERO,
            max_attempts: 5,
        };
        for _ in 0..rounds {
            // Re-enqueued messages may sit a moment in the delayed set.
            let mut delivery = None;
            for _ in 0..50 {
                match queue.dequeue(Duration::from_secs(30)).await.unwrap() {
                    Some(found) => {
                        delivery = Some(found);
                        break;
                    }
                    None => tokio::time::sleep(Duration::from_millis(2)).await,
                }
            }
            let Some(delivery) = delivery else { return };
            run_one(queue, actor, backoff, delivery).await;
        }
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let queue = kv::MemoryQueue::new();
        queue.enqueue(serde_json::json!({"job": 1})).await.unwrap();
        let actor = ScriptedActor::new(2, ErrorKind::Transient);

        drive(&queue, &actor, 5).await;

        assert_eq!(actor.handled.load(Ordering::SeqCst), 3);
        assert!(actor.permanent.lock().unwrap().is_empty());
        // Settled: nothing left to deliver.
        assert!(queue.dequeue(Duration::from_secs(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn permanent_failures_hit_the_hook_without_retry() {
        let queue = kv::MemoryQueue::new();
        queue.enqueue(serde_json::json!({"job": 2})).await.unwrap();
        let actor = ScriptedActor::new(3, ErrorKind::Permanent);

        drive(&queue, &actor, 5).await;

        assert_eq!(actor.handled.load(Ordering::SeqCst), 1);
        assert_eq!(actor.permanent.lock().unwrap().len(), 1);
        assert!(queue.dequeue(Duration::from_secs(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transient_failures_exhaust_into_the_hook() {
        let queue = kv::MemoryQueue::new();
        queue.enqueue(serde_json::json!({"job": 3})).await.unwrap();
        // Fails forever; attempt 5 crosses max_attempts.
        let actor = ScriptedActor::new(u32::MAX, ErrorKind::Transient);

        drive(&queue, &actor, 10).await;

        assert_eq!(actor.handled.load(Ordering::SeqCst), 5);
        assert_eq!(actor.permanent.lock().unwrap().len(), 1);
    }
}
