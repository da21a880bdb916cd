use serde::{Deserialize, Serialize};

/// The task a prompt template serves. Part of a template's identity, together
/// with its name and version.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "prompt_task_type")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PromptTaskType {
    Classification,
    Extraction,
    Validation,
}

impl PromptTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTaskType::Classification => "classification",
            PromptTaskType::Extraction => "extraction",
            PromptTaskType::Validation => "validation",
        }
    }
}
