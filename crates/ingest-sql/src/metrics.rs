use bigdecimal::BigDecimal;
use models::Id;

/// One recorded LLM call against a prompt template.
#[derive(Debug, Clone)]
pub struct CallMetric {
    pub template_id: Id,
    pub job_id: Option<Id>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: BigDecimal,
    pub execution_ms: i32,
    pub success: bool,
    pub overall_confidence: Option<f64>,
    pub manual_review: bool,
}

pub async fn record_call(
    pool: impl sqlx::PgExecutor<'_>,
    metric: &CallMetric,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into prompt_call_metrics
            (template_id, job_id, tokens_in, tokens_out, cost_usd,
             execution_ms, success, overall_confidence, manual_review)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(metric.template_id)
    .bind(metric.job_id)
    .bind(metric.tokens_in)
    .bind(metric.tokens_out)
    .bind(&metric.cost_usd)
    .bind(metric.execution_ms)
    .bind(metric.success)
    .bind(metric.overall_confidence)
    .bind(metric.manual_review)
    .execute(pool)
    .await?;
    Ok(())
}

/// Aggregate raw call metrics for one calendar day into the permanent
/// per-template rollup. Re-running a day overwrites its rollup, so the job
/// is safe to repeat.
pub async fn rollup_day(
    pool: impl sqlx::PgExecutor<'_>,
    day: chrono::NaiveDate,
) -> sqlx::Result<u64> {
    let done = sqlx::query(
        r#"
        insert into prompt_daily_metrics
            (template_id, metric_date, calls, tokens_in, tokens_out, cost_usd,
             successes, manual_reviews, mean_confidence, mean_execution_ms,
             p95_execution_ms)
        select
            template_id,
            $1::date,
            count(*),
            sum(tokens_in),
            sum(tokens_out),
            sum(cost_usd),
            count(*) filter (where success),
            count(*) filter (where manual_review),
            avg(overall_confidence),
            avg(execution_ms),
            percentile_cont(0.95) within group (order by execution_ms)
        from prompt_call_metrics
        where recorded_at >= $1::date
          and recorded_at < $1::date + interval '1 day'
        group by template_id
        on conflict (template_id, metric_date) do update set
            calls = excluded.calls,
            tokens_in = excluded.tokens_in,
            tokens_out = excluded.tokens_out,
            cost_usd = excluded.cost_usd,
            successes = excluded.successes,
            manual_reviews = excluded.manual_reviews,
            mean_confidence = excluded.mean_confidence,
            mean_execution_ms = excluded.mean_execution_ms,
            p95_execution_ms = excluded.p95_execution_ms
        "#,
    )
    .bind(day)
    .execute(pool)
    .await?;
    Ok(done.rows_affected())
}

/// Raw call metrics have a bounded retention; the rollup is permanent.
pub async fn delete_raw_before(
    pool: impl sqlx::PgExecutor<'_>,
    retain_days: i64,
) -> sqlx::Result<u64> {
    let done = sqlx::query(
        "delete from prompt_call_metrics where recorded_at < now() - make_interval(days => $1)",
    )
    .bind(retain_days)
    .execute(pool)
    .await?;
    Ok(done.rows_affected())
}
