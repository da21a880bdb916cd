use ingest_sql::metrics;

/// Raw call metrics are kept this many days; the rollup is permanent.
pub const RAW_RETENTION_DAYS: i64 = 30;

/// Aggregate yesterday's raw call metrics into the per-template daily
/// rollup, then prune raw rows past retention. Re-running is safe: the
/// rollup upserts by `(template_id, date)`.
#[tracing::instrument(skip(pool))]
pub async fn run_daily_rollup(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let yesterday = chrono::Utc::now().date_naive() - chrono::Duration::days(1);

    let rolled = metrics::rollup_day(pool, yesterday).await?;
    let pruned = metrics::delete_raw_before(pool, RAW_RETENTION_DAYS).await?;
    tracing::info!(%yesterday, rolled, pruned, "prompt metrics rollup finished");
    Ok(())
}
