use crate::{Counter, Delivery, Envelope, JobQueue};
use ::redis::AsyncCommands;
use anyhow::Context;
use std::time::Duration;

/// Counter backed by Redis `INCRBYFLOAT`, with the TTL applied only on key
/// creation so a window keeps its original expiry.
#[derive(Clone)]
pub struct RedisCounter {
    conn: ::redis::aio::ConnectionManager,
}

impl RedisCounter {
    pub fn new(conn: ::redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait::async_trait]
impl Counter for RedisCounter {
    async fn incr_f64(&self, key: &str, delta: f64, ttl: Duration) -> anyhow::Result<f64> {
        let mut conn = self.conn.clone();
        let value: f64 = ::redis::cmd("INCRBYFLOAT")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .context("INCRBYFLOAT")?;

        // NX: set the expiry only when the key has none yet.
        let _: i64 = ::redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs() as i64)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .context("EXPIRE NX")?;

        Ok(value)
    }

    async fn get_f64(&self, key: &str) -> anyhow::Result<Option<f64>> {
        let mut conn = self.conn.clone();
        let value: Option<f64> = conn.get(key).await.context("GET")?;
        Ok(value)
    }
}

/// Queue over three Redis structures: a ready list, a delayed sorted set
/// scored by ready-time, and an in-flight hash with visibility deadlines.
/// Dequeue promotes due delayed entries and expired in-flight deliveries
/// before popping, so an abandoned delivery becomes visible again.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ::redis::aio::ConnectionManager,
    ready_key: String,
    delayed_key: String,
    inflight_key: String,
}

impl RedisQueue {
    pub fn new(conn: ::redis::aio::ConnectionManager, name: &str) -> Self {
        Self {
            conn,
            ready_key: format!("{name}:ready"),
            delayed_key: format!("{name}:delayed"),
            inflight_key: format!("{name}:inflight"),
        }
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn promote(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let now = Self::now_millis();

        // Due delayed entries move to the ready list.
        let due: Vec<String> = ::redis::cmd("ZRANGEBYSCORE")
            .arg(&self.delayed_key)
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await
            .context("ZRANGEBYSCORE")?;
        for raw in due {
            let removed: i64 = conn
                .zrem(&self.delayed_key, &raw)
                .await
                .context("ZREM delayed")?;
            // Only the remover enqueues, so racing workers don't duplicate.
            if removed == 1 {
                let _: i64 = conn.lpush(&self.ready_key, &raw).await.context("LPUSH")?;
            }
        }

        // Expired in-flight deliveries return to the ready list with an
        // advanced attempt counter.
        let inflight: Vec<(String, String)> = conn
            .hgetall(&self.inflight_key)
            .await
            .context("HGETALL inflight")?;
        for (receipt, raw) in inflight {
            let (deadline, envelope): (i64, Envelope) =
                serde_json::from_str(&raw).context("decoding in-flight entry")?;
            if deadline > now {
                continue;
            }
            let removed: i64 = conn
                .hdel(&self.inflight_key, &receipt)
                .await
                .context("HDEL inflight")?;
            if removed == 1 {
                let redelivery = Envelope {
                    attempt: envelope.attempt + 1,
                    ..envelope
                };
                let raw = serde_json::to_string(&redelivery)?;
                let _: i64 = conn.lpush(&self.ready_key, raw).await.context("LPUSH")?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&Envelope::new(payload))?;
        let _: i64 = conn.lpush(&self.ready_key, raw).await.context("LPUSH")?;
        Ok(())
    }

    async fn enqueue_delayed(
        &self,
        payload: serde_json::Value,
        delay: Duration,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&Envelope::new(payload))?;
        let ready_at = Self::now_millis() + delay.as_millis() as i64;
        let _: i64 = conn
            .zadd(&self.delayed_key, raw, ready_at)
            .await
            .context("ZADD delayed")?;
        Ok(())
    }

    async fn dequeue(&self, visibility: Duration) -> anyhow::Result<Option<Delivery>> {
        self.promote().await?;

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.rpop(&self.ready_key, None).await.context("RPOP")?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let envelope: Envelope = serde_json::from_str(&raw).context("decoding envelope")?;
        let receipt = envelope.id.clone();
        let deadline = Self::now_millis() + visibility.as_millis() as i64;
        let entry = serde_json::to_string(&(deadline, &envelope))?;
        let _: i64 = conn
            .hset(&self.inflight_key, &receipt, entry)
            .await
            .context("HSET inflight")?;

        Ok(Some(Delivery { receipt, envelope }))
    }

    async fn ack(&self, receipt: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .hdel(&self.inflight_key, receipt)
            .await
            .context("HDEL inflight")?;
        Ok(())
    }

    async fn nack(&self, receipt: &str, delay: Duration) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(&self.inflight_key, receipt)
            .await
            .context("HGET inflight")?;
        let Some(raw) = raw else {
            // Visibility already lapsed; the promote path owns redelivery.
            return Ok(());
        };
        let (_, envelope): (i64, Envelope) =
            serde_json::from_str(&raw).context("decoding in-flight entry")?;

        let removed: i64 = conn
            .hdel(&self.inflight_key, receipt)
            .await
            .context("HDEL inflight")?;
        if removed == 1 {
            let redelivery = Envelope {
                attempt: envelope.attempt + 1,
                ..envelope
            };
            let raw = serde_json::to_string(&redelivery)?;
            let ready_at = Self::now_millis() + delay.as_millis() as i64;
            let _: i64 = conn
                .zadd(&self.delayed_key, raw, ready_at)
                .await
                .context("ZADD delayed")?;
        }
        Ok(())
    }
}

/// Open a Redis connection manager for the given URL.
pub async fn connect(redis_url: &str) -> anyhow::Result<::redis::aio::ConnectionManager> {
    let client = ::redis::Client::open(redis_url).context("parsing redis url")?;
    ::redis::aio::ConnectionManager::new(client)
        .await
        .context("connecting to redis")
}
