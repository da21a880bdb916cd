use chrono::{DateTime, Utc};
use models::{Id, PromptTaskType};

/// A single immutable version of a prompt template.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateRow {
    pub id: Id,
    pub task_type: PromptTaskType,
    pub name: String,
    pub version: i32,
    pub system_text: Option<String>,
    pub user_template: String,
    pub is_active: bool,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub description: String,
}

const SELECT_TEMPLATE: &str = r#"
    select id, task_type, name, version, system_text, user_template,
           is_active, model_name, temperature, max_tokens, created_at,
           created_by, description
    from prompt_templates
"#;

/// Resolve the single active version for `(task_type, name)`.
pub async fn get_active(
    pool: impl sqlx::PgExecutor<'_>,
    task_type: PromptTaskType,
    name: &str,
) -> sqlx::Result<Option<TemplateRow>> {
    sqlx::query_as::<_, TemplateRow>(&format!(
        "{SELECT_TEMPLATE} where task_type = $1 and name = $2 and is_active"
    ))
    .bind(task_type)
    .bind(name)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_version(
    pool: impl sqlx::PgExecutor<'_>,
    task_type: PromptTaskType,
    name: &str,
    version: i32,
) -> sqlx::Result<Option<TemplateRow>> {
    sqlx::query_as::<_, TemplateRow>(&format!(
        "{SELECT_TEMPLATE} where task_type = $1 and name = $2 and version = $3"
    ))
    .bind(task_type)
    .bind(name)
    .bind(version)
    .fetch_optional(pool)
    .await
}

pub async fn list_versions(
    pool: impl sqlx::PgExecutor<'_>,
    task_type: PromptTaskType,
    name: &str,
) -> sqlx::Result<Vec<TemplateRow>> {
    sqlx::query_as::<_, TemplateRow>(&format!(
        "{SELECT_TEMPLATE} where task_type = $1 and name = $2 order by version asc"
    ))
    .bind(task_type)
    .bind(name)
    .fetch_all(pool)
    .await
}

/// The fields an editor supplies for a new version. Versions are immutable:
/// editing is always copy-on-edit through this call.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub task_type: PromptTaskType,
    pub name: String,
    pub system_text: Option<String>,
    pub user_template: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: i32,
    pub created_by: String,
    pub description: String,
}

/// Insert the next version for `(task_type, name)`, starting inactive.
pub async fn create_new_version(
    txn: &mut sqlx::PgConnection,
    id: Id,
    new: &NewTemplate,
) -> sqlx::Result<TemplateRow> {
    sqlx::query_as::<_, TemplateRow>(
        r#"
        insert into prompt_templates
            (id, task_type, name, version, system_text, user_template,
             is_active, model_name, temperature, max_tokens, created_by,
             description)
        select
            $1, $2, $3,
            coalesce(max(version), 0) + 1,
            $4, $5, false, $6, $7, $8, $9, $10
        from prompt_templates
        where task_type = $2 and name = $3
        returning
            id, task_type, name, version, system_text, user_template,
            is_active, model_name, temperature, max_tokens, created_at,
            created_by, description
        "#,
    )
    .bind(id)
    .bind(new.task_type)
    .bind(&new.name)
    .bind(&new.system_text)
    .bind(&new.user_template)
    .bind(&new.model_name)
    .bind(new.temperature)
    .bind(new.max_tokens)
    .bind(&new.created_by)
    .bind(&new.description)
    .fetch_one(txn)
    .await
}

/// Atomically deactivate the current active version (if any) and activate the
/// target version. Rollback is this same operation against a prior version.
pub async fn activate(
    txn: &mut sqlx::PgConnection,
    task_type: PromptTaskType,
    name: &str,
    version: i32,
) -> sqlx::Result<bool> {
    sqlx::query(
        r#"
        update prompt_templates
        set is_active = false
        where task_type = $1 and name = $2 and is_active
        "#,
    )
    .bind(task_type)
    .bind(name)
    .execute(&mut *txn)
    .await?;

    let done = sqlx::query(
        r#"
        update prompt_templates
        set is_active = true
        where task_type = $1 and name = $2 and version = $3
        "#,
    )
    .bind(task_type)
    .bind(name)
    .bind(version)
    .execute(txn)
    .await?;
    Ok(done.rows_affected() == 1)
}
