//! Template rendering.
//!
//! Substitutes `{{name}}` tokens with values from a JSON variables object.
//! Unknown tokens are left literal and missing variables never fail a
//! render; rendered bodies are persisted so retries stay deterministic even
//! if the template changes later.

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid token regex"));

/// Render a template body against a variables object.
pub fn render(template: &str, variables: &serde_json::Value) -> String {
    TOKEN_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match variables.get(name) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                Some(serde_json::Value::Bool(b)) => b.to_string(),
                // Null, arrays, objects and missing variables stay literal.
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Distinct `{{token}}` names appearing in a body, in first-seen order.
/// Used to derive a template's declared variable list.
pub fn extract_tokens(template: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in TOKEN_RE.captures_iter(template) {
        let name = caps[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_known_tokens() {
        let vars = json!({"name": "Ada", "count": 3});
        assert_eq!(render("Hello {{name}}, {{count}} new items", &vars), "Hello Ada, 3 new items");
    }

    #[test]
    fn tolerates_whitespace_in_tokens() {
        let vars = json!({"name": "Ada"});
        assert_eq!(render("Hi {{ name }}", &vars), "Hi Ada");
    }

    #[test]
    fn unknown_tokens_stay_literal() {
        let vars = json!({"name": "Ada"});
        assert_eq!(render("Hi {{name}}, ref {{order_id}}", &vars), "Hi Ada, ref {{order_id}}");
    }

    #[test]
    fn null_and_structured_values_stay_literal() {
        let vars = json!({"a": null, "b": {"nested": 1}});
        assert_eq!(render("{{a}}/{{b}}", &vars), "{{a}}/{{b}}");
    }

    #[test]
    fn render_without_variables_is_identity() {
        assert_eq!(render("plain text", &json!({})), "plain text");
    }

    #[test]
    fn extracts_distinct_tokens_in_order() {
        let tokens = extract_tokens("{{name}} bought {{item}} x{{count}}, thanks {{name}}!");
        assert_eq!(tokens, vec!["name", "item", "count"]);
    }
}
