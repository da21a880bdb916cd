use ingest_sql::prompts::{self, NewTemplate, TemplateRow};
use models::{Id, IdGenerator, PromptTaskType};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("no active template for ({task_type:?}, {name})")]
    NotFound {
        task_type: PromptTaskType,
        name: String,
    },
    #[error("template version not found")]
    VersionNotFound,
    #[error("template rendering failed")]
    Render(#[source] handlebars::RenderError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// An active template resolved and rendered for one call.
#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub template_id: Id,
    pub version: i32,
    pub system: Option<String>,
    pub user_text: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: i32,
}

/// The versioned prompt store. Templates are immutable; editors always
/// create a new version and flip activation.
pub struct Registry {
    pool: sqlx::PgPool,
    id_gen: Mutex<IdGenerator>,
}

impl Registry {
    pub fn new(pool: sqlx::PgPool, shard: u16) -> Self {
        Self {
            pool,
            id_gen: Mutex::new(IdGenerator::new(shard)),
        }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    /// Resolve the active version. A single indexed lookup.
    pub async fn get_active(
        &self,
        task_type: PromptTaskType,
        name: &str,
    ) -> Result<TemplateRow, PromptError> {
        prompts::get_active(&self.pool, task_type, name)
            .await?
            .ok_or_else(|| PromptError::NotFound {
                task_type,
                name: name.to_string(),
            })
    }

    /// Resolve the active version and render it with the given variables.
    pub async fn resolve<T: serde::Serialize>(
        &self,
        task_type: PromptTaskType,
        name: &str,
        variables: &T,
    ) -> Result<ResolvedPrompt, PromptError> {
        let template = self.get_active(task_type, name).await?;
        let user_text = crate::render(&template.user_template, variables)?;
        Ok(ResolvedPrompt {
            template_id: template.id,
            version: template.version,
            system: template.system_text,
            user_text,
            model_name: template.model_name,
            temperature: template.temperature,
            max_tokens: template.max_tokens,
        })
    }

    /// Create the next version for `(task_type, name)`; starts inactive.
    pub async fn create_new_version(&self, new: &NewTemplate) -> Result<TemplateRow, PromptError> {
        let id = self.id_gen.lock().unwrap().next();
        let mut txn = self.pool.begin().await?;
        let row = prompts::create_new_version(&mut txn, id, new).await?;
        txn.commit().await?;
        Ok(row)
    }

    /// Atomically swap activation to the named version. Rollback is exactly
    /// this call against a prior version.
    pub async fn activate(
        &self,
        task_type: PromptTaskType,
        name: &str,
        version: i32,
    ) -> Result<(), PromptError> {
        let mut txn = self.pool.begin().await?;
        let activated = prompts::activate(&mut txn, task_type, name, version).await?;
        if !activated {
            txn.rollback().await?;
            return Err(PromptError::VersionNotFound);
        }
        txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(
        &self,
        task_type: PromptTaskType,
        name: &str,
        version: i32,
    ) -> Result<(), PromptError> {
        self.activate(task_type, name, version).await
    }
}
