use crate::registry::PromptError;

/// Render a template with named variables, conditionals, and whitespace
/// control (`{{~ ... ~}}`). Strict mode makes an undefined variable a
/// distinguishable render error rather than an empty substitution.
pub fn render<T: serde::Serialize>(template: &str, variables: &T) -> Result<String, PromptError> {
    let mut hb = handlebars::Handlebars::new();
    hb.set_strict_mode(true);
    hb.render_template(template, variables)
        .map_err(PromptError::Render)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn substitutes_named_variables() {
        let out = render(
            "Betreff: {{subject}} von {{sender}}",
            &json!({"subject": "Mahnung", "sender": "inkasso@example.de"}),
        )
        .unwrap();
        assert_eq!(out, "Betreff: Mahnung von inkasso@example.de");
    }

    #[test]
    fn supports_conditionals_and_trim() {
        let template = "Forderung{{#if creditor}} von {{creditor}}{{/if}}.";
        let with = render(template, &json!({"creditor": "Müller Inkasso"})).unwrap();
        assert_eq!(with, "Forderung von Müller Inkasso.");
        let without = render(template, &json!({"creditor": null})).unwrap();
        assert_eq!(without, "Forderung.");

        let trimmed = render(
            "{{~#if x}}  ja  {{~/if}}",
            &json!({"x": true}),
        )
        .unwrap();
        assert_eq!(trimmed, "  ja");
    }

    #[test]
    fn undefined_variable_is_a_distinguishable_error() {
        let err = render("Hallo {{wer}}", &json!({})).unwrap_err();
        assert!(matches!(err, PromptError::Render(_)));
    }
}
