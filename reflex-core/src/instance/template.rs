//! Template Interpolation
//!
//! Replaces every `{{ name }}` in a template with the display form of the
//! value `name` resolves to. There are no expressions, filters, or
//! directives: the text between the braces is trimmed and used as a
//! property name.

use crate::value::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Interpolate `template`, resolving names through `resolve`.
///
/// `Undefined` and `Null` render as the empty string. An opening `{{`
/// without a closing `}}` is kept as text. The result is trimmed.
pub fn interpolate<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Value,
{
    let template = template.trim();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        out.push_str(&rest[..start]);
        let name = after_open[..end].trim();
        out.push_str(&resolve(name).to_display_string());
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);

    out.trim().to_string()
}

/// Names referenced by `template`, in order of first use.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    interpolate(template, |name| {
        if !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
        Value::Undefined
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup(name: &str) -> Value {
        match name {
            "name" => Value::from("reflex"),
            "count" => Value::Int(3),
            "ratio" => Value::Float(0.5),
            "flag" => Value::Bool(true),
            "nothing" => Value::Null,
            "list" => Value::from(json!([1, 2])),
            _ => Value::Undefined,
        }
    }

    #[test]
    fn replaces_placeholders() {
        assert_eq!(
            interpolate("<p>{{ name }} has {{count}} items</p>", lookup),
            "<p>reflex has 3 items</p>"
        );
        assert_eq!(interpolate("{{ratio}} {{flag}}", lookup), "0.5 true");
    }

    #[test]
    fn missing_values_render_empty() {
        assert_eq!(interpolate("[{{ missing }}][{{ nothing }}]", lookup), "[][]");
    }

    #[test]
    fn objects_render_as_json() {
        assert_eq!(interpolate("{{ list }}", lookup), "[1,2]");
    }

    #[test]
    fn result_is_trimmed() {
        assert_eq!(interpolate("  {{ name }}  ", lookup), "reflex");
        assert_eq!(interpolate("{{ missing }} tail", lookup), "tail");
    }

    #[test]
    fn unclosed_braces_are_text() {
        assert_eq!(interpolate("{{ name }} {{ oops", lookup), "reflex {{ oops");
    }

    #[test]
    fn placeholder_names() {
        assert_eq!(
            placeholders("{{ a }} {{b}} {{ a }}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
