use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use models::Id;

/// An outstanding inquiry the matcher resolves extracted parties against.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InquiryRow {
    pub id: Id,
    pub ticket_id: String,
    pub case_reference: Option<String>,
    pub client_name: String,
    pub creditor_name: String,
    pub amount: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
}

const SELECT_INQUIRY: &str = r#"
    select id, ticket_id, case_reference, client_name, creditor_name,
           amount, created_at
    from outstanding_inquiries
"#;

pub async fn fetch_by_ticket(
    pool: impl sqlx::PgExecutor<'_>,
    ticket_id: &str,
) -> sqlx::Result<Vec<InquiryRow>> {
    sqlx::query_as::<_, InquiryRow>(&format!(
        "{SELECT_INQUIRY} where ticket_id = $1 order by created_at desc"
    ))
    .bind(ticket_id)
    .fetch_all(pool)
    .await
}

/// Recent inquiries, newest first, bounded by a recency window.
pub async fn fetch_recent(
    pool: impl sqlx::PgExecutor<'_>,
    window_days: i64,
    limit: i64,
) -> sqlx::Result<Vec<InquiryRow>> {
    sqlx::query_as::<_, InquiryRow>(&format!(
        r#"{SELECT_INQUIRY}
        where created_at > now() - make_interval(days => $1)
        order by created_at desc
        limit $2"#
    ))
    .bind(window_days)
    .bind(limit)
    .fetch_all(pool)
    .await
}
