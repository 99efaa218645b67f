use serde_json::{json, Value};

use crate::models::analysis::ParseOutcome;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub outcome: ParseOutcome,
    /// Always a JSON object.
    pub value: Value,
}

/// Read a generated response as a JSON object, degrading instead of failing:
/// the whole text, then the first embedded object, then the raw text wrapped
/// as `{"raw_response": ...}`.
pub fn parse_llm_response(response: &str) -> ParsedResponse {
    if let Some(value) = parse_object(response.trim()) {
        return ParsedResponse {
            outcome: ParseOutcome::Structured,
            value,
        };
    }

    let recovered = extract_json(response)
        .and_then(parse_object)
        .or_else(|| balanced_object(response).and_then(parse_object));
    if let Some(value) = recovered {
        return ParsedResponse {
            outcome: ParseOutcome::Recovered,
            value,
        };
    }

    tracing::debug!("No JSON object in response, keeping raw text");
    ParsedResponse {
        outcome: ParseOutcome::Raw,
        value: json!({ "raw_response": response }),
    }
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

fn extract_json(text: &str) -> Option<&str> {
    // Try to find JSON block in markdown code blocks
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return Some(text[start..start + end].trim());
        }
    }

    // Try plain code block
    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip any language identifier on the same line
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with('{') {
                return Some(content);
            }
        }
    }

    balanced_object(text)
}

/// First `{ ... }` span whose braces balance, ignoring braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
