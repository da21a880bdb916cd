use chrono::{DateTime, Utc};
use models::{Id, ReconciliationStatus, TextJson};

#[derive(Debug, sqlx::FromRow)]
pub struct ReportRow {
    pub id: Id,
    pub run_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_checked: i32,
    pub mismatches_found: i32,
    pub auto_repaired: i32,
    pub failed_repairs: i32,
    pub status: ReconciliationStatus,
    pub details: Option<TextJson<serde_json::Value>>,
    pub error_message: Option<String>,
}

/// Open a new report in `running` state.
pub async fn open_report(pool: impl sqlx::PgExecutor<'_>, id: Id) -> sqlx::Result<()> {
    sqlx::query("insert into reconciliation_reports (id, status) values ($1, 'running')")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Tallies gathered during a reconciliation run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReportTallies {
    pub records_checked: i32,
    pub mismatches_found: i32,
    pub auto_repaired: i32,
    pub failed_repairs: i32,
}

/// Seal a report. Reports are immutable once completed; a second completion
/// of the same report is a no-op.
pub async fn complete_report(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    status: ReconciliationStatus,
    tallies: &ReportTallies,
    details: &serde_json::Value,
    error_message: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update reconciliation_reports
        set completed_at = now(),
            status = $2,
            records_checked = $3,
            mismatches_found = $4,
            auto_repaired = $5,
            failed_repairs = $6,
            details = $7,
            error_message = $8
        where id = $1 and completed_at is null
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(tallies.records_checked)
    .bind(tallies.mismatches_found)
    .bind(tallies.auto_repaired)
    .bind(tallies.failed_repairs)
    .bind(TextJson(details))
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn latest_reports(
    pool: impl sqlx::PgExecutor<'_>,
    limit: i64,
) -> sqlx::Result<Vec<ReportRow>> {
    sqlx::query_as::<_, ReportRow>(
        r#"
        select id, run_at, completed_at, records_checked, mismatches_found,
               auto_repaired, failed_repairs, status, details, error_message
        from reconciliation_reports
        order by run_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
