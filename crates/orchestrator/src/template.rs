//! Output-to-input templating between pipeline steps.

const PLACEHOLDER: &str = "{{input}}";

/// Renders a step's input from its template and the previous step's
/// output. Every placeholder occurrence is replaced; an empty or absent
/// template passes the previous output through unchanged.
pub fn render(template: Option<&str>, input: &str) -> String {
    match template {
        Some(template) if !template.trim().is_empty() => {
            template.replace(PLACEHOLDER, input)
        }
        _ => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_previous_output() {
        assert_eq!(render(Some("Review: {{input}}"), "foo"), "Review: foo");
    }

    #[test]
    fn empty_template_passes_output_through() {
        assert_eq!(render(None, "foo"), "foo");
        assert_eq!(render(Some(""), "foo"), "foo");
        assert_eq!(render(Some("   "), "foo"), "foo");
    }

    #[test]
    fn every_placeholder_occurrence_is_replaced() {
        assert_eq!(
            render(Some("{{input}} and {{input}}"), "x"),
            "x and x"
        );
    }

    #[test]
    fn template_without_placeholder_is_used_verbatim() {
        assert_eq!(render(Some("fixed prompt"), "ignored"), "fixed prompt");
    }
}
