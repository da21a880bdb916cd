use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// The single document-store write shape: a creditor's debt amount keyed by
/// `(ticket_id, creditor_identifier)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtRecord {
    pub ticket_id: String,
    pub creditor_identifier: String,
    #[serde(default)]
    pub client_name: Option<String>,
    pub amount: BigDecimal,
}

/// Document-store failures, split along the retry boundary: `Unavailable`
/// is transient and retried with backoff, `Rejected` parks the message in
/// `failed` until a human intervenes.
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store rejected the write: {0}")]
    Rejected(String),
}

impl DocError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DocError::Unavailable(_))
    }
}

/// The narrow document-store interface the core consumes. Writes MUST be
/// idempotent given the saga's idempotency key.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert_debt(&self, record: &DebtRecord, idempotency_key: &str)
        -> Result<(), DocError>;

    async fn fetch_by_ticket(&self, ticket_id: &str) -> Result<Option<DebtRecord>, DocError>;

    async fn fetch_by_client_name(
        &self,
        client_name: &str,
    ) -> Result<Option<DebtRecord>, DocError>;

    /// Cheap availability probe; reconciliation skips the drift comparison
    /// when this fails.
    async fn health(&self) -> bool;
}

/// REST-backed document store. A conflict response is treated as idempotent
/// success: the keyed write already landed.
pub struct HttpDocumentStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpDocumentStore {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpDocumentStore {
    #[tracing::instrument(skip_all, fields(ticket_id = %record.ticket_id, idempotency_key))]
    async fn upsert_debt(
        &self,
        record: &DebtRecord,
        idempotency_key: &str,
    ) -> Result<(), DocError> {
        let response = self
            .http
            .post(self.url("/v1/debt-records"))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(record)
            .send()
            .await
            .map_err(|err| DocError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            // 409 means the keyed write was already applied.
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(DocError::Rejected(format!("{status}: {detail}")))
        } else {
            Err(DocError::Unavailable(format!("{status}: {detail}")))
        }
    }

    async fn fetch_by_ticket(&self, ticket_id: &str) -> Result<Option<DebtRecord>, DocError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/debt-records/{ticket_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| DocError::Unavailable(err.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|err| DocError::Rejected(format!("decoding record: {err}"))),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(DocError::Unavailable(status.to_string())),
        }
    }

    async fn fetch_by_client_name(
        &self,
        client_name: &str,
    ) -> Result<Option<DebtRecord>, DocError> {
        let response = self
            .http
            .get(self.url("/v1/debt-records"))
            .query(&[("client_name", client_name)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| DocError::Unavailable(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let mut records: Vec<DebtRecord> = response
                    .json()
                    .await
                    .map_err(|err| DocError::Rejected(format!("decoding records: {err}")))?;
                let first = records.drain(..).next();
                Ok(first)
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(DocError::Unavailable(status.to_string())),
        }
    }

    async fn health(&self) -> bool {
        self.http
            .get(self.url("/healthz"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// In-memory document store for tests. Tracks applied idempotency keys so
/// tests can assert the no-double-effect property.
#[derive(Default)]
pub struct MemoryDocumentStore {
    records: Mutex<HashMap<String, DebtRecord>>,
    applied_keys: Mutex<HashSet<String>>,
    unavailable: Mutex<bool>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn insert(&self, record: DebtRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.ticket_id.clone(), record);
    }

    pub fn get(&self, ticket_id: &str) -> Option<DebtRecord> {
        self.records.lock().unwrap().get(ticket_id).cloned()
    }

    /// How many distinct keyed writes took effect.
    pub fn applied_count(&self) -> usize {
        self.applied_keys.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert_debt(
        &self,
        record: &DebtRecord,
        idempotency_key: &str,
    ) -> Result<(), DocError> {
        if *self.unavailable.lock().unwrap() {
            return Err(DocError::Unavailable("store offline".to_string()));
        }
        let mut applied = self.applied_keys.lock().unwrap();
        if !applied.insert(idempotency_key.to_string()) {
            // The keyed effect already happened once.
            return Ok(());
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.ticket_id.clone(), record.clone());
        Ok(())
    }

    async fn fetch_by_ticket(&self, ticket_id: &str) -> Result<Option<DebtRecord>, DocError> {
        if *self.unavailable.lock().unwrap() {
            return Err(DocError::Unavailable("store offline".to_string()));
        }
        Ok(self.records.lock().unwrap().get(ticket_id).cloned())
    }

    async fn fetch_by_client_name(
        &self,
        client_name: &str,
    ) -> Result<Option<DebtRecord>, DocError> {
        if *self.unavailable.lock().unwrap() {
            return Err(DocError::Unavailable("store offline".to_string()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|record| {
                record
                    .client_name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(client_name))
            })
            .cloned())
    }

    async fn health(&self) -> bool {
        !*self.unavailable.lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn record(ticket: &str, amount: &str) -> DebtRecord {
        DebtRecord {
            ticket_id: ticket.to_string(),
            creditor_identifier: "inkasso-krueger".to_string(),
            client_name: Some("Anna Schäfer".to_string()),
            amount: BigDecimal::from_str(amount).unwrap(),
        }
    }

    #[tokio::test]
    async fn repeated_keyed_write_applies_once() {
        let store = MemoryDocumentStore::new();
        store.upsert_debt(&record("T-1", "120.00"), "key-1").await.unwrap();
        store.upsert_debt(&record("T-1", "999.00"), "key-1").await.unwrap();

        // The second write with the same key is a no-op.
        assert_eq!(store.get("T-1").unwrap().amount, BigDecimal::from_str("120.00").unwrap());
        assert_eq!(store.applied_count(), 1);
    }

    #[tokio::test]
    async fn unavailability_is_transient() {
        let store = MemoryDocumentStore::new();
        store.set_unavailable(true);
        let err = store
            .upsert_debt(&record("T-2", "50.00"), "key-2")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
