use models::{CorrectionType, Id, TextJson};

/// Record a calibration sample captured from a resolved review item.
pub async fn insert(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    job_id: Id,
    dimensions: &serde_json::Value,
    confidence_bucket: &str,
    document_type: &str,
    was_correct: bool,
    correction_type: Option<CorrectionType>,
    correction_details: Option<&serde_json::Value>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into calibration_samples
            (id, job_id, dimensions, confidence_bucket, document_type,
             was_correct, correction_type, correction_details)
        values ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(job_id)
    .bind(TextJson(dimensions))
    .bind(confidence_bucket)
    .bind(document_type)
    .bind(was_correct)
    .bind(correction_type)
    .bind(correction_details.map(TextJson))
    .execute(pool)
    .await?;
    Ok(())
}
