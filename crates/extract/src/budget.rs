use crate::ExtractError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-job token budget. Checked before every vendor call and debited with
/// the vendor-reported usage afterwards, so the sum of charged tokens never
/// exceeds the cap.
pub struct TokenBudget {
    cap: u64,
    warn_at: u64,
    used: AtomicU64,
    warned: AtomicBool,
}

impl TokenBudget {
    pub const DEFAULT_CAP: u64 = 100_000;

    pub fn new(cap: u64) -> Self {
        Self {
            cap,
            warn_at: cap * 8 / 10,
            used: AtomicU64::new(0),
            warned: AtomicBool::new(false),
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    pub fn remaining(&self) -> u64 {
        self.cap.saturating_sub(self.used())
    }

    /// Refuse when the estimated cost would exceed the remaining budget.
    pub fn check(&self, estimated_tokens: u64) -> Result<(), ExtractError> {
        let used = self.used();
        if used + estimated_tokens > self.cap {
            return Err(ExtractError::BudgetExceeded);
        }
        if used + estimated_tokens > self.warn_at && !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                used,
                estimated_tokens,
                cap = self.cap,
                "job token budget past warning threshold"
            );
        }
        Ok(())
    }

    /// Debit the vendor-reported actual usage.
    pub fn debit(&self, actual_tokens: u64) {
        self.used.fetch_add(actual_tokens, Ordering::Relaxed);
    }
}

/// Daily cost circuit breaker over the KV counter: one float cell per UTC
/// calendar day with a 48-hour expiry. The estimated cost is recorded
/// *before* the vendor call, so a crash between call and settlement can
/// never blow the budget; settlement adjusts to the actual cost afterwards.
#[derive(Clone)]
pub struct DailyCostBreaker {
    counter: Arc<dyn kv::Counter>,
    cap_usd: f64,
}

impl DailyCostBreaker {
    pub const DEFAULT_CAP_USD: f64 = 50.0;
    const TTL: Duration = Duration::from_secs(48 * 3600);

    pub fn new(counter: Arc<dyn kv::Counter>, cap_usd: f64) -> Self {
        Self { counter, cap_usd }
    }

    fn key() -> String {
        format!("llm_cost:{}", chrono::Utc::now().format("%Y-%m-%d"))
    }

    /// Refuse when the day's recorded spend has reached the cap.
    pub async fn check(&self) -> Result<(), ExtractError> {
        let spent = self
            .counter
            .get_f64(&Self::key())
            .await
            .map_err(ExtractError::Other)?
            .unwrap_or(0.0);
        if spent >= self.cap_usd {
            return Err(ExtractError::DailyLimitExceeded);
        }
        Ok(())
    }

    /// Optimistically record the estimated cost ahead of the call.
    pub async fn pre_record(&self, estimated_usd: f64) -> Result<(), ExtractError> {
        self.counter
            .incr_f64(&Self::key(), estimated_usd, Self::TTL)
            .await
            .map_err(ExtractError::Other)?;
        Ok(())
    }

    /// Replace the estimate with the actual cost once usage is known.
    pub async fn settle(&self, estimated_usd: f64, actual_usd: f64) -> Result<(), ExtractError> {
        let delta = actual_usd - estimated_usd;
        if delta != 0.0 {
            self.counter
                .incr_f64(&Self::key(), delta, Self::TTL)
                .await
                .map_err(ExtractError::Other)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn budget_refuses_past_cap_and_sums_below_it() {
        let budget = TokenBudget::new(1000);
        assert!(budget.check(400).is_ok());
        budget.debit(400);
        assert!(budget.check(500).is_ok());
        budget.debit(500);
        // 900 used; another 200 would exceed the cap.
        assert!(matches!(
            budget.check(200),
            Err(ExtractError::BudgetExceeded)
        ));
        assert!(budget.check(100).is_ok());
        assert_eq!(budget.remaining(), 100);
        assert!(budget.used() <= 1000);
    }

    #[tokio::test]
    async fn breaker_opens_at_cap_with_one_overshoot_at_most() {
        let counter = Arc::new(kv::MemoryCounter::new());
        let breaker = DailyCostBreaker::new(counter, 10.0);

        // Below cap: allowed, even if this call itself overshoots.
        breaker.check().await.unwrap();
        breaker.pre_record(9.0).await.unwrap();
        breaker.check().await.unwrap();
        breaker.pre_record(4.0).await.unwrap();

        // Recorded 13.0 >= 10.0: the breaker is open for further calls.
        assert!(matches!(
            breaker.check().await,
            Err(ExtractError::DailyLimitExceeded)
        ));

        // Settling downward re-arms the breaker below the cap.
        breaker.settle(4.0, 0.5).await.unwrap();
        breaker.check().await.unwrap();
    }
}
