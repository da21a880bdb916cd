use crate::registry::{PromptError, Registry};
use ingest_sql::prompts::NewTemplate;
use models::PromptTaskType;

const INTENT_TEMPLATE: &str = r#"Du klassifizierst eingehende E-Mails an ein Forderungsmanagement.
Ordne die Nachricht genau einer Kategorie zu:
debt_statement, payment_plan, rejection, inquiry, auto_reply, spam.

Betreff: {{subject}}
Absender: {{sender}}
Text:
{{body}}

Antworte nur mit einem JSON-Objekt:
{"intent": "<kategorie>", "confidence": <0.0-1.0>}"#;

const VISION_TEMPLATE: &str = r#"Du liest ein deutsches Gläubigerschreiben ({{filename}}).
Extrahiere die folgenden Felder und antworte nur mit einem JSON-Objekt:
{
  "gesamtforderung": "<Betrag als Zeichenkette, z.B. 1.234,56>",
  "glaeubiger": "<Name des Gläubigers oder null>",
  "schuldner": "<Name des Schuldners oder null>",
  "komponenten": {
    "hauptforderung": "<Betrag oder null>",
    "zinsen": "<Betrag oder null>",
    "kosten": "<Betrag oder null>"
  }
}
Wenn keine Gesamtforderung genannt ist, summiere Hauptforderung, Zinsen
und Kosten. Lass Felder null, die im Dokument nicht vorkommen."#;

/// Install the built-in templates as version 1 where no active version
/// exists yet. Installed versions are immutable like any other; operators
/// supersede them through `create_new_version` + `activate`.
pub async fn ensure_default_templates(
    registry: &Registry,
    classify_model: &str,
    vision_model: &str,
) -> Result<(), PromptError> {
    let defaults = [
        NewTemplate {
            task_type: PromptTaskType::Classification,
            name: "intent".to_string(),
            system_text: None,
            user_template: INTENT_TEMPLATE.to_string(),
            model_name: classify_model.to_string(),
            temperature: 0.0,
            max_tokens: 256,
            created_by: "seed".to_string(),
            description: "Six-way intent classification with confidence".to_string(),
        },
        NewTemplate {
            task_type: PromptTaskType::Extraction,
            name: "vision_document".to_string(),
            system_text: None,
            user_template: VISION_TEMPLATE.to_string(),
            model_name: vision_model.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            created_by: "seed".to_string(),
            description: "Vision extraction of Gesamtforderung and parties".to_string(),
        },
    ];

    for template in defaults {
        match registry.get_active(template.task_type, &template.name).await {
            Ok(_) => continue,
            Err(PromptError::NotFound { .. }) => {
                let row = registry.create_new_version(&template).await?;
                registry
                    .activate(template.task_type, &template.name, row.version)
                    .await?;
                tracing::info!(
                    task_type = ?template.task_type,
                    name = %template.name,
                    version = row.version,
                    "installed default prompt template"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
